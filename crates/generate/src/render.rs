//! Parameter renderer: expands `{{ tag }}` placeholders anywhere in a
//! Kustomization using one parameter record.
//!
//! The document is serialized to JSON, substituted as text, and parsed
//! back. Replacement values are JSON-string-escaped before insertion so a
//! substitution can never break out of its string context.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use kuset_core::{Kustomization, ParamRecord};

/// Render one Kustomization instance from `params`. An empty record
/// returns the input untouched; an unresolvable placeholder is a hard
/// error for this instance.
pub fn render_kustomization(k: &Kustomization, params: &ParamRecord) -> Result<Kustomization> {
    if params.is_empty() {
        return Ok(k.clone());
    }
    let raw = serde_json::to_string(k).context("serializing template for rendering")?;
    let substituted = substitute(&raw, params)?;
    serde_json::from_str(&substituted).context("parsing rendered template")
}

fn substitute(input: &str, params: &ParamRecord) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| anyhow!("unterminated placeholder in template"))?;
        out.push_str(&eval_tag(after[..end].trim(), params)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn eval_tag(tag: &str, params: &ParamRecord) -> Result<String> {
    let (helper, path) = match tag.split_once(char::is_whitespace) {
        Some((h, rest)) => (Some(h), rest.trim()),
        None => (None, tag),
    };
    let value = lookup(path, params).ok_or_else(|| anyhow!("failed to resolve {{{{{tag}}}}}"))?;
    let rendered = render_scalar(value).with_context(|| format!("rendering {{{{{tag}}}}}"))?;
    match helper {
        None => Ok(escape(&rendered)),
        Some("sanitize") => Ok(escape(&sanitize_dns_name(&rendered))),
        Some(other) => bail!("unknown template function {other:?} in {{{{{tag}}}}}"),
    }
}

/// Dotted-path lookup into the record; a leading dot is optional.
fn lookup<'a>(path: &str, params: &'a ParamRecord) -> Option<&'a Value> {
    let mut segments = path.trim_start_matches('.').split('.');
    let mut current = params.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn render_scalar(v: &Value) -> Result<String> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("placeholder resolves to a non-scalar value: {other}"),
    }
}

/// Escape special characters for insertion into a JSON document: the
/// quoted form of the string minus its surrounding quotes.
fn escape(s: &str) -> String {
    let quoted = Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Reduce a value to a DNS label: lowercase alphanumerics separated by
/// single dashes, at most 63 characters.
pub fn sanitize_dns_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    let mut label = trimmed.to_string();
    label.truncate(63);
    while label.ends_with('-') {
        label.pop();
    }
    label
}
