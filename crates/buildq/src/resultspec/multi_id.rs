use anyhow::{Result, anyhow};

use super::columns::{DISPLAY_ID_FIELD, FieldMapping, resolve_column};
use super::{Filter, FilterValue, RequestArgs};

/// Recognized multi-id request parameters. Closed set: each variant binds a
/// parameter name carrying a comma-separated id list, the logical field it
/// filters, and the element conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiIdParam {
    DisplayIds,
    BuilderIds,
    BuildIds,
    RequestIds,
}

pub const MULTI_ID_PARAMS: &[MultiIdParam] = &[
    MultiIdParam::DisplayIds,
    MultiIdParam::BuilderIds,
    MultiIdParam::BuildIds,
    MultiIdParam::RequestIds,
];

impl MultiIdParam {
    #[must_use]
    pub const fn arg_name(self) -> &'static str {
        match self {
            Self::DisplayIds => "display_ids",
            Self::BuilderIds => "builder_ids",
            Self::BuildIds => "build_ids",
            Self::RequestIds => "request_ids",
        }
    }

    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::DisplayIds => DISPLAY_ID_FIELD,
            Self::BuilderIds => "builderid",
            Self::BuildIds => "buildid",
            Self::RequestIds => "buildrequestid",
        }
    }

    fn convert(self, piece: &str) -> Result<FilterValue> {
        match self {
            Self::DisplayIds => Ok(FilterValue::Text(piece.to_string())),
            Self::BuilderIds | Self::BuildIds | Self::RequestIds => piece
                .parse::<i64>()
                .map(FilterValue::Integer)
                .map_err(|_| {
                    anyhow!(
                        "invalid integer `{piece}` in multi-id parameter `{}`",
                        self.arg_name()
                    )
                }),
        }
    }
}

/// Pops every recognized multi-id parameter from the request arguments and
/// rewrites it into one in-set filter over its bound field. A list element
/// that fails its conversion rejects the whole request.
pub fn augment_filters(args: &mut RequestArgs) -> Result<Vec<Filter>> {
    let mut filters = Vec::new();
    for param in MULTI_ID_PARAMS {
        let Some(raw) = args.pop(param.arg_name()) else {
            continue;
        };
        let values = raw
            .split(',')
            .map(|piece| param.convert(piece))
            .collect::<Result<Vec<_>>>()?;
        filters.push(Filter::in_set(param.field(), values));
    }
    Ok(filters)
}

/// Boot-time check: every bound logical field must resolve against the
/// mapping, so a misconfigured binding fails at startup instead of per
/// request.
pub fn validate_params(mapping: &FieldMapping) -> Result<()> {
    for param in MULTI_ID_PARAMS {
        if let Err(error) = resolve_column(mapping, param.field()) {
            return Err(error.context(format!(
                "multi-id parameter `{}` is bound to an unresolvable field",
                param.arg_name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MultiIdParam, augment_filters, validate_params};
    use crate::resultspec::{
        FilterOp, FilterValue, RequestArgs, builds_field_mapping, properties_field_mapping,
    };

    #[test]
    fn integer_lists_become_in_set_filters_and_are_popped() {
        let mut args = RequestArgs::from_pairs([("build_ids", "3,5,9"), ("limit", "10")]);
        let filters = augment_filters(&mut args).expect("augmentation should succeed");

        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].field, "buildid");
        assert_eq!(filters[0].op, FilterOp::In);
        assert_eq!(
            filters[0].values,
            vec![
                FilterValue::Integer(3),
                FilterValue::Integer(5),
                FilterValue::Integer(9)
            ]
        );
        assert!(!args.contains("build_ids"));
        assert!(args.contains("limit"), "unrelated args must remain");
    }

    #[test]
    fn display_id_lists_pass_through_as_text() {
        let mut args = RequestArgs::from_pairs([("display_ids", "7-42,7-43")]);
        let filters = augment_filters(&mut args).expect("augmentation should succeed");

        assert_eq!(filters[0].field, "display_id");
        assert_eq!(
            filters[0].values,
            vec![
                FilterValue::Text("7-42".to_string()),
                FilterValue::Text("7-43".to_string())
            ]
        );
    }

    #[test]
    fn one_bad_element_rejects_the_whole_request() {
        let mut args = RequestArgs::from_pairs([("builder_ids", "3,x")]);
        let err = augment_filters(&mut args).expect_err("malformed element must fail");
        assert!(err.to_string().contains("builder_ids"));
        assert!(err.to_string().contains('x'));
    }

    #[test]
    fn every_bound_field_resolves_against_the_builds_mapping() {
        validate_params(&builds_field_mapping()).expect("builds mapping must cover all params");
    }

    #[test]
    fn validation_fails_over_a_mapping_without_the_bound_fields() {
        let err = validate_params(&properties_field_mapping())
            .expect_err("properties mapping lacks the build fields");
        assert!(err.to_string().contains("display_ids"));
    }

    #[test]
    fn param_bindings_are_stable() {
        assert_eq!(MultiIdParam::BuildIds.arg_name(), "build_ids");
        assert_eq!(MultiIdParam::BuildIds.field(), "buildid");
        assert_eq!(MultiIdParam::RequestIds.field(), "buildrequestid");
    }
}
