use std::sync::Arc;

use anyhow::Result;

use crate::db::Db;
use crate::models::{BuildId, BuildView, PropertyBundle};
use crate::resultspec::{RequestArgs, ResultSpec, builds_field_mapping, multi_id};
use crate::store::{builds, properties};

/// Read path for "list builds" requests.
///
/// Collaborators are injected at construction; the endpoint holds no
/// request state and may be shared across concurrent request handlers.
#[derive(Debug, Clone)]
pub struct BuildsEndpoint {
    db: Arc<Db>,
}

impl BuildsEndpoint {
    /// Construction validates the multi-id field bindings against the
    /// builds mapping, so a misconfigured binding fails at boot.
    pub fn new(db: Arc<Db>) -> Result<Self> {
        multi_id::validate_params(&builds_field_mapping())?;
        Ok(Self { db })
    }

    /// Lists builds for one request: resolves the change or builder scope,
    /// runs the base query with the remaining spec, batch-attaches the
    /// requested properties, and materializes one view per build row.
    ///
    /// Properties cost at most one backing-store round trip regardless of
    /// how many builds are returned, and none at all when the request
    /// carries no property projection.
    pub fn list_builds(
        &self,
        args: &mut RequestArgs,
        spec: &mut ResultSpec,
    ) -> Result<Vec<BuildView>> {
        let rows = if let Some(changeid) = args.pop_i64("changeid")? {
            builds::get_builds_for_change(&self.db, changeid)?
        } else {
            let mut builderid = None;
            if args.contains("builderid") || args.contains("buildername") {
                builderid = builds::resolve_builder_id(&self.db, args)?;
                if builderid.is_none() {
                    return Ok(Vec::new());
                }
            }

            let complete = spec.pop_boolean_filter("complete");
            let spec_requestid = spec.pop_integer_filter("buildrequestid");
            let buildrequestid = args.pop_i64("buildrequestid")?.or(spec_requestid);
            let workerid = args.pop_i64("workerid")?;

            builds::get_builds(&self.db, builderid, buildrequestid, workerid, complete, spec)?
        };

        let projection = spec.pop_properties();
        let defer_properties = args.pop_bool("defer_properties")?.unwrap_or(false);

        // No batch fetch when nothing was projected, and none when a
        // downstream composition layer resolves properties itself.
        let bundle = match (&projection, defer_properties) {
            (Some(projection), false) => {
                let build_ids: Vec<BuildId> = rows.iter().map(|row| row.id).collect();
                properties::fetch_many(&self.db, &build_ids, projection.names(), None)?
            }
            _ => PropertyBundle::new(),
        };

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut view = BuildView::from_row(row);
            if defer_properties {
                view.properties = None;
            } else if let Some(props) = bundle.get(&row.id)
                && !props.is_empty()
            {
                view.properties = Some(props.clone());
            }
            views.push(view);
        }
        Ok(views)
    }
}
