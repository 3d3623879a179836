//! Hidden checkpoint removal
//!
//! Produces a copy of a stage document without the checkpoints flagged as
//! hidden, for maps handed out to the teams. Only stage groups are filtered;
//! every other node of the document is copied as it is.

use crate::extract::{FeatureAttributes, FeatureContext, check_extension, group_name, point_geometry};
use crate::kml::{Element, Node};
use crate::{Config, CourseError, KmlDocument, Result, is_stage_group};
use std::path::{Path, PathBuf};

/// Copy of a stage group without its hidden point placemarks
fn filter_group(folder: &Element, group: &str) -> Result<(Element, usize)> {
    let mut filtered = folder.shallow_clone();
    let mut removed = 0;
    let mut position = 0;

    for node in folder.children() {
        let checkpoint = match node {
            Node::Element(child) if child.is("Placemark") && point_geometry(child).is_some() => {
                Some(child)
            }
            _ => None,
        };
        if let Some(child) = checkpoint {
            position += 1;
            let context = FeatureContext::new(group, position, child);
            if context.hidden(&FeatureAttributes::from_placemark(child))? {
                removed += 1;
                continue;
            }
        }
        filtered.push(node.clone());
    }

    Ok((filtered, removed))
}

/// Build a copy of `document` with hidden checkpoints removed from stage groups
///
/// The source document is left untouched. Non-stage groups, styles, schemas
/// and the document name are carried over unchanged.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn strip_hidden(document: &KmlDocument, config: &Config) -> Result<KmlDocument> {
    let source = document.root();
    let container = document.container()?;

    let mut filtered_container = container.shallow_clone();
    let mut removed = 0;
    for node in container.children() {
        match node {
            Node::Element(folder) if folder.is("Folder") => {
                let group = group_name(folder);
                if is_stage_group(&group, config.group_delimiter) {
                    let (filtered, count) = filter_group(folder, &group)?;
                    tracing::debug!("Group '{group}': removed {count} hidden checkpoint(s)");
                    removed += count;
                    filtered_container.push(filtered);
                } else {
                    filtered_container.push(node.clone());
                }
            }
            other => filtered_container.push(other.clone()),
        }
    }

    // Only the first <Document> is the container, any later one is copied as is
    let mut root = source.shallow_clone();
    let mut filtered_container = Some(filtered_container);
    for node in source.children() {
        match node {
            Node::Element(element) if element.is("Document") => match filtered_container.take() {
                Some(filtered) => root.push(filtered),
                None => root.push(node.clone()),
            },
            other => root.push(other.clone()),
        }
    }

    tracing::debug!("Removed {removed} hidden checkpoint(s) in total");
    KmlDocument::new(root)
}

/// Path of the filtered copy: the file stem with `suffix` appended, same extension
///
/// `routes/course.kml` with suffix `hidden_removed` becomes
/// `routes/coursehidden_removed.kml`.
pub fn filtered_path(path: impl AsRef<Path>, suffix: &str) -> PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut file_name = format!("{stem}{suffix}");
    if let Some(extension) = path.extension() {
        file_name.push('.');
        file_name.push_str(&extension.to_string_lossy());
    }
    path.with_file_name(file_name)
}

/// Read a stage document, strip its hidden checkpoints and write the result
/// next to it
///
/// # Returns
/// The path of the written copy
pub fn strip_hidden_file(path: impl AsRef<Path>, config: &Config) -> Result<PathBuf> {
    let path = path.as_ref();
    check_extension(path, config)?;

    let document = KmlDocument::read(path)?;
    let filtered = strip_hidden(&document, config).map_err(|e| e.in_file(path))?;

    let output = filtered_path(path, &config.filtered_suffix);
    if output == path {
        return Err(CourseError::InvariantViolation(
            "filtered copy would overwrite its source".to_string(),
        )
        .in_file(path));
    }
    filtered.write(&output)?;

    tracing::info!("Wrote {} without hidden checkpoints", output.display());
    Ok(output)
}
