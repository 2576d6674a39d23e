use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::as_base;
use crate::id::Identifier;
use crate::profile::{ProfileRecord, Source};
use crate::{Result, RosterError};

const LOG_PREFIX: &str = "[directory]";

const GLYPH_PREFIX: &str = "glyphicon-";
const GLYPH_EMAIL: &str = "glyphicon-envelope";
const GLYPH_PHONE: &str = "glyphicon-earphone";
const GLYPH_ADDRESS: &str = "glyphicon-briefcase";

/// Bulk source: the whole roster in one call.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn roster(&self) -> Result<Vec<ProfileRecord>>;
}

/// Scrapes the people pages of a department directory, one page per
/// category.
pub struct HtmlDirectory {
    client: reqwest::Client,
    base: Url,
    categories: Vec<String>,
}

impl HtmlDirectory {
    pub fn new(client: reqwest::Client, base: Url, categories: Vec<String>) -> Self {
        Self {
            client,
            base: as_base(base),
            categories,
        }
    }

    async fn load_category(&self, category: &str) -> Result<Vec<ProfileRecord>> {
        let url = self.base.join(category)?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(RosterError::Other(anyhow::anyhow!(
                "{} answered {}",
                url,
                response.status()
            )));
        }
        let body = response.text().await?;
        parse_people(&body, &self.base)
    }
}

#[async_trait]
impl DirectorySource for HtmlDirectory {
    /// Categories are read in order; an identifier listed in several
    /// categories keeps the record from the last one.
    async fn roster(&self) -> Result<Vec<ProfileRecord>> {
        let mut people = Vec::new();
        let mut failures = 0;
        for category in &self.categories {
            match self.load_category(category).await {
                Ok(records) => {
                    log::debug!(
                        "{} {} people in {}",
                        LOG_PREFIX,
                        records.len(),
                        category
                    );
                    people.extend(records);
                }
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        "{} skipping category {}: {}",
                        LOG_PREFIX,
                        category,
                        e
                    );
                }
            }
        }

        if failures > 0 && failures == self.categories.len() {
            return Err(RosterError::Other(anyhow::anyhow!(
                "no directory category could be loaded"
            )));
        }
        log::info!("{} roster holds {} people", LOG_PREFIX, people.len());
        Ok(people)
    }
}

struct Selectors {
    person: Selector,
    name: Selector,
    link: Selector,
    small: Selector,
    title: Selector,
    degree: Selector,
    photo: Selector,
    address_item: Selector,
    glyph: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            person: selector("div.person")?,
            name: selector("h2.person-name")?,
            link: selector("a")?,
            small: selector("small")?,
            title: selector("div.person-title")?,
            degree: selector("div.person-degree")?,
            photo: selector("div.person-photo img")?,
            address_item: selector("span.person-address-item")?,
            glyph: selector("span.glyphicon")?,
        })
    }
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| RosterError::Parse(format!("{:?}", e)))
}

/// Turn one directory page into profile records. People without an email
/// address have no identifier and are left out.
pub fn parse_people(body: &str, base: &Url) -> Result<Vec<ProfileRecord>> {
    let selectors = Selectors::new()?;
    let html = Html::parse_document(body);

    let people = html
        .select(&selectors.person)
        .filter_map(|person| {
            let record = parse_person(person, &selectors, base);
            if record.is_none() {
                log::trace!("{} skipping entry without identifier", LOG_PREFIX);
            }
            record
        })
        .collect();
    Ok(people)
}

fn parse_person(
    person: ElementRef,
    selectors: &Selectors,
    base: &Url,
) -> Option<ProfileRecord> {
    let full_name = select_name(person, selectors)?;

    let photo_link = person
        .select(&selectors.photo)
        .next()
        .and_then(|img| img.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
        .and_then(|src| base.join(src.trim()).ok());

    let mut identifier = None;
    let mut extra: Vec<(&str, String)> = Vec::new();

    if let Some(title) = select_text(person, &selectors.title) {
        extra.push(("title", title));
    }
    if let Some(degree) = select_text(person, &selectors.degree) {
        extra.push(("degree", degree));
    }

    for item in person.select(&selectors.address_item) {
        let glyph = match item.select(&selectors.glyph).next() {
            Some(glyph) => glyph,
            None => continue,
        };
        let kinds: Vec<&str> = glyph
            .value()
            .attr("class")
            .unwrap_or_default()
            .split_whitespace()
            .filter(|class| class.starts_with(GLYPH_PREFIX))
            .collect();
        let text = item.text().collect::<String>().trim().to_owned();

        if kinds.contains(&GLYPH_EMAIL) {
            if let Some((id, email)) = parse_email(&text) {
                identifier = Some(id);
                extra.push(("email", email));
            }
        }
        if kinds.contains(&GLYPH_PHONE) {
            extra.push(("phone", text.clone()));
        }
        if kinds.contains(&GLYPH_ADDRESS) {
            extra.push(("address", text));
        }
    }

    let mut record =
        ProfileRecord::new(identifier?, full_name, Source::Directory, photo_link);
    for (key, value) in extra {
        record = record.with_extra(key, value);
    }
    Some(record)
}

/// The linked name when there is one, otherwise the heading text minus any
/// `<small>` annotation.
fn select_name(person: ElementRef, selectors: &Selectors) -> Option<String> {
    let heading = person.select(&selectors.name).next()?;
    if let Some(link) = heading.select(&selectors.link).next() {
        return non_empty(link.text().collect::<String>());
    }

    let mut text = heading.text().collect::<String>();
    if let Some(small) = heading.select(&selectors.small).next() {
        let annotation = small.text().collect::<String>();
        text = text.replace(&annotation, "");
    }
    non_empty(text)
}

fn select_text(person: ElementRef, selector: &Selector) -> Option<String> {
    let element = person.select(selector).next()?;
    non_empty(element.text().collect::<String>())
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// `j.doe@cs.example.edu)` gives identifier `jdoe` and email
/// `jdoe@cs.example.edu`.
fn parse_email(text: &str) -> Option<(Identifier, String)> {
    let (local, domain) = text.split_once('@')?;
    let id = Identifier::from_email(local).ok()?;
    let domain = domain.trim().trim_matches(')');
    let email = format!("{}@{}", id, domain);
    Some((id, email))
}
