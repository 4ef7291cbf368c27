//! Instance Catalog Parsing
//!
//! Turns raw declaration lines from the CK instance headers into
//! [`ConvInstance`] records.
//!
//! ## Line format
//!
//! ```text
//! <prefix>DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3<arg0, arg1, S<4, 64, 1>, ...>,
//! ```
//!
//! Arguments are comma separated, except `S<...>` sub-lists which form one
//! integer-tuple argument.
//!
//! ## Example
//!
//! ```rust
//! use templar::catalog::scan_template_args;
//! use templar::instance::TemplateArg;
//!
//! let args = scan_template_args("-1, NHWGC, GKYXC, S<1,4,2>, NHWGK").unwrap();
//! assert_eq!(args[3], TemplateArg::Tuple(vec![1, 4, 2]));
//! ```

mod library;

pub use library::{
    collect_catalog_lines, conv_instances_path, gen_conv_ops_library, load_conv_library,
    reset_conv_ops_library, CatalogCache, CONV_INSTANCES_SUBDIR,
};

use tracing::debug;

use crate::error::{Result, TemplarError};
use crate::instance::{ConvInstance, TemplateArg};

/// Template class whose instantiations make up the catalog
pub const CONV_TEMPLATE_MARKER: &str = "DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3";

const SUB_LIST_OPEN: &str = "S<";

/// Slot the catalog spells as `NDimSpatial`; recomputed downstream
const SPATIAL_DIMS_SLOT: usize = 0;
/// `DsLayout` slot, auxiliary operands are not used
const DS_LAYOUT_SLOT: usize = 3;
/// `DsDataType` slot, auxiliary operands are not used
const DS_DTYPE_SLOT: usize = 9;

/// Check whether a line declares a template instance
#[must_use]
pub fn is_declaration(line: &str) -> bool {
    line.contains(CONV_TEMPLATE_MARKER)
}

/// Extract the argument text of a declaration line.
///
/// Takes everything after the last marker occurrence, drops a trailing `//`
/// comment and strips the template's own angle brackets and trailing commas.
#[must_use]
pub fn declaration_arguments(line: &str) -> &str {
    let tail = line
        .rsplit_once(CONV_TEMPLATE_MARKER)
        .map_or(line, |(_, tail)| tail);
    let tail = tail.split_once("//").map_or(tail, |(code, _)| code);
    let tail = tail.trim().trim_end_matches(',').trim_end();
    let tail = tail.strip_prefix('<').unwrap_or(tail);
    let tail = tail.strip_suffix('>').unwrap_or(tail);
    tail.trim()
}

/// Scan a comma separated argument list in a single left-to-right pass.
///
/// `S<...>` sub-lists become one [`TemplateArg::Tuple`]; any other token
/// becomes an integer when it parses as one, otherwise a string.
pub fn scan_template_args(text: &str) -> Result<Vec<TemplateArg>> {
    let mut args = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let rest = &text[cursor..];
        if rest.starts_with(char::is_whitespace) {
            cursor += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        }

        if let Some(body) = rest.strip_prefix(SUB_LIST_OPEN) {
            let close = body
                .find('>')
                .ok_or_else(|| TemplarError::MalformedSubList(rest.to_string()))?;
            args.push(TemplateArg::Tuple(parse_sub_list(&body[..close])?));
            // only whitespace may sit between `>` and the separating comma
            let after = &body[close + 1..];
            let (gap, consumed) = after
                .find(',')
                .map_or((after, after.len()), |comma| (&after[..comma], comma + 1));
            if !gap.trim().is_empty() {
                return Err(TemplarError::MalformedSubList(format!(
                    "S<{}>{}",
                    &body[..close],
                    gap.trim_end()
                )));
            }
            cursor += SUB_LIST_OPEN.len() + close + 1 + consumed;
        } else {
            match rest.find(',') {
                Some(comma) => {
                    args.push(TemplateArg::from_token(&rest[..comma]));
                    cursor += comma + 1;
                }
                None => {
                    args.push(TemplateArg::from_token(rest));
                    break;
                }
            }
        }
    }

    Ok(args)
}

fn parse_sub_list(body: &str) -> Result<Vec<i64>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    body.split(',')
        .map(|item| {
            item.trim()
                .parse::<i64>()
                .map_err(|_| TemplarError::MalformedSubList(format!("S<{body}>")))
        })
        .collect()
}

/// Parse one declaration line into an instance record
pub fn parse_instance(line: &str) -> Result<ConvInstance> {
    let mut args = scan_template_args(declaration_arguments(line))?;
    if args.len() <= DS_DTYPE_SLOT {
        return Err(TemplarError::ArgumentCount {
            expected: format!(
                "{}..={}",
                crate::instance::REQUIRED_ARGS,
                crate::instance::MAX_ARGS
            ),
            found: args.len(),
        });
    }

    args[SPATIAL_DIMS_SLOT] = TemplateArg::Int(-1);
    args[DS_LAYOUT_SLOT] = TemplateArg::Tuple(Vec::new());
    args[DS_DTYPE_SLOT] = TemplateArg::Tuple(Vec::new());

    ConvInstance::from_template_args(args)
}

/// Parse declaration lines into instance records.
///
/// Lines without the template marker and blank lines are skipped. The first
/// malformed declaration fails the whole catalog.
pub fn parse_instances<'a, I>(lines: I) -> Result<Vec<ConvInstance>>
where
    I: IntoIterator<Item = &'a str>,
{
    let instances = lines
        .into_iter()
        .filter(|line| !line.trim().is_empty() && is_declaration(line))
        .map(parse_instance)
        .collect::<Result<Vec<_>>>()?;

    debug!(count = instances.len(), "parsed catalog instances");
    Ok(instances)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Sub-lists never split into separate arguments
        #[test]
        fn test_sub_list_is_one_argument(
            head in prop::collection::vec(0i64..1000, 0..5),
            items in prop::collection::vec(0i64..1000, 1..6),
            tail in prop::collection::vec("[A-Z][A-Za-z0-9]{0,8}", 0..5)
        ) {
            let sub = items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            let mut parts: Vec<String> = head.iter().map(ToString::to_string).collect();
            parts.push(format!("S<{sub}>"));
            parts.extend(tail.iter().cloned());
            let args = scan_template_args(&parts.join(", ")).unwrap();

            prop_assert_eq!(args.len(), head.len() + 1 + tail.len());
            prop_assert_eq!(&args[head.len()], &TemplateArg::Tuple(items.clone()));
        }
    }
}
