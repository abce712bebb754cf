use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::{self, write_tag};
use crate::refs::{tag_ref, update_ref};
use crate::repo::Repo;
use crate::types::Tag;

/// create an annotated tag and its `refs/tags/<name>` ref
///
/// the ref is created with compare-and-swap against "absent", so an
/// existing tag of the same name yields `Conflict`.
pub fn create_tag(
    repo: &Repo,
    name: &str,
    target: &ObjectId,
    message: &str,
    tagger: Option<&str>,
) -> Result<ObjectId> {
    let target_kind = object::get(repo, target)?.kind;
    let tagger = tagger
        .map(str::to_string)
        .unwrap_or_else(|| repo.config().author());

    let tag = Tag::new(*target, target_kind, name, tagger, message);
    let id = write_tag(repo, &tag)?;

    let ref_name = tag_ref(name);
    update_ref(repo, &ref_name, None, id)?;

    tracing::info!(tag = %ref_name, target = %target, "created tag");
    Ok(id)
}
