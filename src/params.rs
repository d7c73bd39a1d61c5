use std::collections::BTreeMap;

use crate::catalog::EndpointDescriptor;

/// Substitutes `{name}` placeholders with percent-encoded values.
///
/// Placeholders without a value are left in the output as literal text.
pub fn render_path(template: &str, path_params: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (k, v) in path_params {
        let needle = EndpointDescriptor::placeholder(k);
        if out.contains(&needle) {
            out = out.replace(&needle, urlencoding::encode(v).as_ref());
        }
    }
    out
}

/// Builds `?k=v&..` for the set parameters, in the order given by `names`.
pub fn render_query<'a>(
    names: impl IntoIterator<Item = &'a str>,
    values: &BTreeMap<String, String>,
) -> String {
    let pairs: Vec<String> = names
        .into_iter()
        .filter_map(|name| {
            values.get(name).map(|value| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
        })
        .collect();
    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

/// Splits a `NAME=VALUE` argument.
pub fn split_key_value(value: &str) -> Option<(&str, &str)> {
    value.split_once('=')
}

pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}
