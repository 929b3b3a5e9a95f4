//! Type name conventions
//!
//! Type names are namespace-separated paths (`/NS1/NS2/Name`). Derived types
//! encode their structure in the name:
//!
//! - `/float[10]` - array of 10 `/float`
//! - `/float*` - pointer to `/float`
//! - `/std/vector</float>` - container (template instantiation) of `/float`
//!
//! Slashes and commas inside template arguments belong to the arguments, so
//! every helper here tracks `<>` nesting instead of splitting naively.

use crate::error::{SchemaError, SchemaResult};

/// Namespace separator
pub const SEPARATOR: char = '/';

/// Check that `name` is a well-formed absolute type name
pub fn validate(name: &str) -> SchemaResult<()> {
    let invalid = || SchemaError::InvalidName(name.to_string());

    if !name.starts_with(SEPARATOR) || name.len() < 2 {
        return Err(invalid());
    }

    let mut depth = 0i32;
    let mut previous = '\0';
    for c in name.chars() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid());
                }
            }
            SEPARATOR if depth == 0 && previous == SEPARATOR => return Err(invalid()),
            _ => {}
        }
        previous = c;
    }

    if depth != 0 || (name.ends_with(SEPARATOR) && name.len() > 1) {
        return Err(invalid());
    }
    Ok(())
}

/// Split a name into its top-level path components, ignoring separators
/// nested in template arguments
fn split_top_level(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in name.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            SEPARATOR if depth == 0 => {
                parts.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&name[start..]);
    parts
}

/// Last path component: `/NS/T<…>` -> `T<…>`
pub fn basename(name: &str) -> &str {
    split_top_level(name).last().copied().unwrap_or(name)
}

/// Namespace of a name, always terminated by the separator: `/NS/T` -> `/NS/`
pub fn namespace(name: &str) -> &str {
    let base = basename(name);
    &name[..name.len() - base.len()]
}

/// `/float[10]` -> `Some(("/float", 10))`
pub fn split_array(name: &str) -> Option<(&str, usize)> {
    let stripped = name.strip_suffix(']')?;
    let open = stripped.rfind('[')?;
    let len = stripped[open + 1..].parse().ok()?;
    Some((&stripped[..open], len))
}

/// `/float*` -> `Some("/float")`
pub fn split_pointer(name: &str) -> Option<&str> {
    name.strip_suffix('*')
}

/// `/std/vector</float>` -> `Some(("/std/vector", vec!["/float"]))`
///
/// Returns `None` unless the name ends with a balanced template argument list.
pub fn split_template(name: &str) -> Option<(&str, Vec<&str>)> {
    let inner_end = name.strip_suffix('>')?.len();

    let mut depth = 0i32;
    let mut open = None;
    for (i, c) in name[..inner_end].char_indices().rev() {
        match c {
            '>' => depth += 1,
            '<' if depth == 0 => {
                open = Some(i);
                break;
            }
            '<' => depth -= 1,
            _ => {}
        }
    }
    let open = open?;

    let args_str = &name[open + 1..inner_end];
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in args_str.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                args.push(args_str[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(args_str[start..].trim());

    Some((&name[..open], args))
}

/// Name of the array of `len` elements of `element`
pub fn array_name(element: &str, len: usize) -> String {
    format!("{}[{}]", element, len)
}

/// Name of the pointer to `target`
pub fn pointer_name(target: &str) -> String {
    format!("{}*", target)
}

/// Name of the instantiation of container `kind` on `element`
pub fn container_name(kind: &str, element: &str) -> String {
    format!("{}<{}>", kind, element)
}

/// Generic array form: `/float[10]` -> `/float[]`
pub fn generic_array_name(name: &str) -> Option<String> {
    split_array(name).map(|(element, _)| format!("{}[]", element))
}

/// Generic container form: `/std/vector</float>` -> `/std/vector<>`
pub fn generic_container_name(name: &str) -> Option<String> {
    split_template(name).map(|(kind, _)| format!("{}<>", kind))
}
