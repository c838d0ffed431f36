use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::db::Db;
use crate::endpoint::BuildsEndpoint;
use crate::resultspec::{Filter, FilterValue, RequestArgs, ResultSpec};

#[derive(Debug, Clone, Args)]
pub struct BuildsArgs {
    /// Path to the build mart database.
    #[arg(long, value_name = "PATH")]
    pub db: PathBuf,

    /// Raw request arguments as key=value pairs (changeid, builderid,
    /// buildername, workerid, buildrequestid, build_ids, builder_ids,
    /// request_ids, display_ids, defer_properties).
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    /// Order fields; a leading `-` sorts descending.
    #[arg(long, value_name = "FIELD")]
    pub order: Vec<String>,

    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,

    #[arg(long, value_name = "N")]
    pub offset: Option<u64>,

    /// Property names to attach; `*` attaches all.
    #[arg(long = "property", value_name = "NAME")]
    pub properties: Vec<String>,

    /// Filter on build completion.
    #[arg(long, value_name = "BOOL")]
    pub complete: Option<bool>,
}

pub fn run(args: &BuildsArgs) -> Result<()> {
    let db = Db::open(&args.db)?;
    db.ensure_schema()?;

    let mut request_args = parse_request_args(&args.args)?;
    if !args.order.is_empty() {
        request_args.insert("order", args.order.join(","));
    }
    if let Some(limit) = args.limit {
        request_args.insert("limit", limit.to_string());
    }
    if let Some(offset) = args.offset {
        request_args.insert("offset", offset.to_string());
    }
    if !args.properties.is_empty() {
        request_args.insert("property", args.properties.join(","));
    }

    let mut spec = ResultSpec::from_request(&mut request_args)?;
    if let Some(complete) = args.complete {
        spec.filters
            .push(Filter::eq("complete", FilterValue::Boolean(complete)));
    }

    let endpoint = BuildsEndpoint::new(Arc::new(db))?;
    let views = endpoint.list_builds(&mut request_args, &mut spec)?;

    if !request_args.is_empty() {
        let unrecognized: Vec<&str> = request_args.keys().collect();
        bail!("unrecognized request arguments: {}", unrecognized.join(", "));
    }

    let encoded =
        serde_json::to_string_pretty(&views).context("failed to encode build views")?;
    println!("{encoded}");

    Ok(())
}

fn parse_request_args(pairs: &[String]) -> Result<RequestArgs> {
    let mut args = RequestArgs::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("request argument `{pair}` is not a KEY=VALUE pair");
        };
        args.insert(key, value);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::parse_request_args;

    #[test]
    fn splits_key_value_pairs_on_the_first_equals() {
        let args = parse_request_args(&[
            "buildername=lin64".to_string(),
            "display_ids=7-42,7-43".to_string(),
        ])
        .expect("pairs should parse");

        assert!(args.contains("buildername"));
        assert!(args.contains("display_ids"));
    }

    #[test]
    fn rejects_arguments_without_an_equals() {
        let err = parse_request_args(&["buildername".to_string()])
            .expect_err("bare key must be rejected");
        assert!(err.to_string().contains("buildername"));
    }
}
