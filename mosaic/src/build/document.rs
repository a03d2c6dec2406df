//! Document builder.
//!
//! A plain document read parses the base bytes as JSON and runs the path's
//! patch chain over the result. The sub-path form performs a structural
//! query (JSON Pointer) against the already-cached parent document rather
//! than re-reading and re-patching.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AssetError;
use crate::id::AssetId;
use crate::payload::AssetPayload;

use super::{BuildContext, BuildOutcome};

pub(crate) fn build(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    match id.sub_path() {
        Some(pointer) => query(ctx, id, pointer),
        None => plain(ctx, id),
    }
}

fn plain(ctx: &BuildContext<'_>, id: &AssetId) -> Result<BuildOutcome, AssetError> {
    let descriptor = ctx.descriptor(id)?;
    let bytes = descriptor.read().map_err(|err| AssetError::Source {
        path: id.path().to_string(),
        message: err.to_string(),
    })?;

    let base: Value = serde_json::from_slice(&bytes).map_err(|err| AssetError::Parse {
        path: id.path().to_string(),
        message: err.to_string(),
    })?;

    let patched = ctx
        .patches
        .apply_document(base, id.path(), &descriptor.patches);
    Ok(BuildOutcome::Ready(AssetPayload::Document(Arc::new(
        patched,
    ))))
}

fn query(ctx: &BuildContext<'_>, id: &AssetId, pointer: &str) -> Result<BuildOutcome, AssetError> {
    let parent_id = id.base();
    let Some(parent) = ctx.deps.try_dependency(&parent_id)? else {
        return Ok(BuildOutcome::Pending);
    };

    let document = match parent {
        AssetPayload::Document(document) => document,
        other => {
            return Err(AssetError::Parse {
                path: id.to_string(),
                message: format!("parent resolved to a {} payload", other.kind()),
            })
        }
    };

    match document.pointer(pointer) {
        Some(value) => Ok(BuildOutcome::Ready(AssetPayload::Document(Arc::new(
            value.clone(),
        )))),
        None => Err(AssetError::Parse {
            path: id.to_string(),
            message: format!("no value at pointer '{pointer}'"),
        }),
    }
}
