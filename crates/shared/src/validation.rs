use std::collections::HashSet;

use url::Url;

use crate::items::{
    Achievement, Education, Extracurricular, Link, OrderedItem, PortfolioProject, WorkExperience,
};

pub const LINK_TITLE_MAX: usize = 50;
pub const LINK_DESCRIPTION_MAX: usize = 65;
pub const SHORT_TEXT_MAX: usize = 120;
pub const LONG_TEXT_MAX: usize = 1000;
pub const DISPLAY_NAME_MAX: usize = 60;
pub const HEADLINE_MAX: usize = 100;
pub const BIO_MAX: usize = 500;
pub const USERNAME_MAX: usize = 32;
pub const URL_MAX: usize = 2048;
pub const TECHNOLOGIES_MAX: usize = 20;
pub const TECHNOLOGY_NAME_MAX: usize = 40;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;

/// Per-item field checks. Returns one message per violated rule.
pub trait ValidateItem {
    fn violations(&self) -> Vec<String>;
}

/// Checks a whole collection before it replaces the stored one.
pub fn validate_collection<T: OrderedItem + ValidateItem>(items: &[T]) -> Result<(), String> {
    let max = T::KIND.max_items();
    if items.len() > max {
        return Err(format!(
            "{} holds at most {max} items, got {}",
            T::KIND,
            items.len()
        ));
    }

    let mut seen = HashSet::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if item.id().trim().is_empty() {
            return Err(format!("{} item {index} has an empty id", T::KIND));
        }
        if !seen.insert(item.id()) {
            return Err(format!("{} item id '{}' is duplicated", T::KIND, item.id()));
        }
        if let Some(first) = item.violations().into_iter().next() {
            return Err(format!("{} item {index}: {first}", T::KIND));
        }
    }
    Ok(())
}

pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

pub fn is_http_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Usernames form the public profile URL, so they are restricted to a URL-safe alphabet.
pub fn validate_username(username: &str) -> Result<(), String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("username cannot be empty".into());
    }
    if char_len(username) > USERNAME_MAX {
        return Err(format!("username exceeds {USERNAME_MAX} characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err("username may only contain letters, digits, '-', '_' and '.'".into());
    }
    Ok(())
}

/// Rules for a password chosen at first login. Existing passwords are only verified.
pub fn validate_password(password: &str) -> Result<(), String> {
    let len = char_len(password);
    if len < PASSWORD_MIN {
        return Err(format!("password must be at least {PASSWORD_MIN} characters"));
    }
    if len > PASSWORD_MAX {
        return Err(format!("password exceeds {PASSWORD_MAX} characters"));
    }
    Ok(())
}

fn required(out: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        out.push(format!("{field} is required"));
    }
}

fn max_len(out: &mut Vec<String>, field: &str, value: &str, max: usize) {
    if char_len(value) > max {
        out.push(format!("{field} exceeds {max} characters"));
    }
}

fn max_len_opt(out: &mut Vec<String>, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        max_len(out, field, value, max);
    }
}

fn http_url(out: &mut Vec<String>, field: &str, value: &str) {
    if char_len(value) > URL_MAX {
        out.push(format!("{field} exceeds {URL_MAX} characters"));
    } else if !is_http_url(value) {
        out.push(format!("{field} must be an http(s) URL"));
    }
}

fn url_opt(out: &mut Vec<String>, field: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        http_url(out, field, value);
    }
}

fn technologies(out: &mut Vec<String>, values: &[String]) {
    if values.len() > TECHNOLOGIES_MAX {
        out.push(format!(
            "technologies holds at most {TECHNOLOGIES_MAX} entries, got {}",
            values.len()
        ));
    }
    if values.iter().any(|t| char_len(t) > TECHNOLOGY_NAME_MAX) {
        out.push(format!(
            "technologies entries exceed {TECHNOLOGY_NAME_MAX} characters"
        ));
    }
}

impl ValidateItem for Link {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        required(&mut out, "title", &self.title);
        max_len(&mut out, "title", &self.title, LINK_TITLE_MAX);
        max_len_opt(
            &mut out,
            "description",
            self.description.as_deref(),
            LINK_DESCRIPTION_MAX,
        );
        max_len_opt(&mut out, "icon", self.icon.as_deref(), SHORT_TEXT_MAX);
        http_url(&mut out, "url", &self.url);
        out
    }
}

impl ValidateItem for WorkExperience {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        required(&mut out, "company", &self.company);
        required(&mut out, "position", &self.position);
        required(&mut out, "start_date", &self.start_date);
        max_len(&mut out, "company", &self.company, SHORT_TEXT_MAX);
        max_len(&mut out, "position", &self.position, SHORT_TEXT_MAX);
        max_len_opt(&mut out, "location", self.location.as_deref(), SHORT_TEXT_MAX);
        max_len(&mut out, "start_date", &self.start_date, SHORT_TEXT_MAX);
        max_len_opt(&mut out, "end_date", self.end_date.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "description", self.description.as_deref(), LONG_TEXT_MAX);
        if self.current && self.end_date.as_deref().is_some_and(|d| !d.is_empty()) {
            out.push("end_date must be empty for a current position".into());
        }
        out
    }
}

impl ValidateItem for Education {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        required(&mut out, "institution", &self.institution);
        required(&mut out, "degree", &self.degree);
        max_len(&mut out, "institution", &self.institution, SHORT_TEXT_MAX);
        max_len(&mut out, "degree", &self.degree, SHORT_TEXT_MAX);
        max_len_opt(
            &mut out,
            "field_of_study",
            self.field_of_study.as_deref(),
            SHORT_TEXT_MAX,
        );
        max_len_opt(&mut out, "start_date", self.start_date.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "end_date", self.end_date.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "description", self.description.as_deref(), LONG_TEXT_MAX);
        out
    }
}

impl ValidateItem for PortfolioProject {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        required(&mut out, "title", &self.title);
        max_len(&mut out, "title", &self.title, SHORT_TEXT_MAX);
        max_len_opt(&mut out, "description", self.description.as_deref(), LONG_TEXT_MAX);
        url_opt(&mut out, "url", self.url.as_deref());
        url_opt(&mut out, "image_url", self.image_url.as_deref());
        technologies(&mut out, &self.technologies);
        out
    }
}

impl ValidateItem for Achievement {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        required(&mut out, "title", &self.title);
        max_len(&mut out, "title", &self.title, SHORT_TEXT_MAX);
        max_len_opt(&mut out, "issuer", self.issuer.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "date", self.date.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "description", self.description.as_deref(), LONG_TEXT_MAX);
        out
    }
}

impl ValidateItem for Extracurricular {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        required(&mut out, "activity", &self.activity);
        max_len(&mut out, "activity", &self.activity, SHORT_TEXT_MAX);
        max_len_opt(&mut out, "organization", self.organization.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "role", self.role.as_deref(), SHORT_TEXT_MAX);
        max_len_opt(&mut out, "description", self.description.as_deref(), LONG_TEXT_MAX);
        out
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
