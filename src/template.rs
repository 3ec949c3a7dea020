// src/template.rs

//! `${KEY}` placeholder rendering for manifest option values

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(.+?)\}").expect("valid regex"));

/// Variables available to option templates
pub type TemplateVars = BTreeMap<String, String>;

/// Replace every `${KEY}` in `value`
///
/// Substituted text is not rendered again. An undefined key is an error.
pub fn render(value: &str, vars: &TemplateVars) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(value) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let replacement = vars
            .get(key.as_str())
            .ok_or_else(|| Error::TemplateError(key.as_str().to_string()))?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(replacement);
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

/// Render every value of an option map in place
pub fn render_all<'a, I>(values: I, vars: &TemplateVars) -> Result<()>
where
    I: IntoIterator<Item = &'a mut String>,
{
    for value in values {
        *value = render(value, vars)?;
    }
    Ok(())
}
