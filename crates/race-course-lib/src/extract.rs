//! Stage extraction from KML documents
//!
//! Walks the folders of the top-level `<Document>`, keeps the ones named like
//! `Stage_4_cycling` and turns each point placemark inside them into a
//! [`CheckPoint`]. Checkpoint data lives in the placemark's extended data:
//!
//! ```xml
//! <Placemark>
//!   <ExtendedData>
//!     <Data name="score"><value>10</value></Data>
//!     <Data name="hint"><value>Under the bridge</value></Data>
//!     <Data name="hidden"><value>0</value></Data>
//!   </ExtendedData>
//!   <Point><coordinates>5.387,52.155,0</coordinates></Point>
//! </Placemark>
//! ```
//!
//! `SchemaData`/`SimpleData` entries are read the same way. Keys match
//! case-insensitively.

use crate::checkpoint::{parse_hidden_flag, parse_score};
use crate::kml::Element;
use crate::{CheckPoint, Config, CourseError, KmlDocument, Result, Stage, utils};
use std::collections::HashMap;
use std::path::Path;

/// Name of a stage group split into its parts, e.g. `Stage_4_cycling`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageName {
    /// Parsed from the middle part
    pub index: u32,
    /// The last part, unmodified
    pub kind: String,
}

impl StageName {
    /// Parse a group name
    ///
    /// # Returns
    /// `Ok(None)` when the name does not split into exactly three parts (the
    /// group is not a stage group), an error when it does but the middle part
    /// is not a positive integer.
    pub fn parse(name: &str, delimiter: char) -> Result<Option<Self>> {
        let parts: Vec<&str> = name.split(delimiter).collect();
        let [_, index, kind] = parts.as_slice() else {
            return Ok(None);
        };

        let index = index
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|&index| index > 0)
            .ok_or_else(|| CourseError::InvalidStageIndex {
                group: name.to_string(),
            })?;

        Ok(Some(Self {
            index,
            kind: kind.to_string(),
        }))
    }
}

/// Whether a group name follows the three-part stage naming convention
#[inline]
pub fn is_stage_group(name: &str, delimiter: char) -> bool {
    name.split(delimiter).count() == 3
}

/// Name of a group element, empty when it has none
pub(crate) fn group_name(group: &Element) -> String {
    group.child_text("name").unwrap_or_default()
}

/// Point geometry of a placemark, `None` for lines, polygons and the like
pub(crate) fn point_geometry(placemark: &Element) -> Option<&Element> {
    placemark.child("Point")
}

/// Extended data of one placemark, keyed by lower-cased name
#[derive(Debug, Default)]
pub(crate) struct FeatureAttributes(HashMap<String, String>);

impl FeatureAttributes {
    pub(crate) fn from_placemark(placemark: &Element) -> Self {
        let mut attributes = HashMap::new();

        if let Some(extended) = placemark.child("ExtendedData") {
            for data in extended.elements_named("Data") {
                if let Some(name) = data.attribute("name") {
                    let value = data.child_text("value").unwrap_or_default();
                    attributes.insert(name.to_lowercase(), value);
                }
            }
            for schema_data in extended.elements_named("SchemaData") {
                for simple in schema_data.elements_named("SimpleData") {
                    if let Some(name) = simple.attribute("name") {
                        attributes.insert(name.to_lowercase(), simple.text());
                    }
                }
            }
        }

        Self(attributes)
    }

    /// Look up a lower-case key
    #[inline]
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Identifies a placemark in error messages
pub(crate) struct FeatureContext<'a> {
    group: &'a str,
    feature: String,
}

impl<'a> FeatureContext<'a> {
    pub(crate) fn new(group: &'a str, position: usize, placemark: &Element) -> Self {
        let feature = match placemark.child_text("name") {
            Some(name) if !name.is_empty() => format!("#{position} '{name}'"),
            _ => format!("#{position}"),
        };
        Self { group, feature }
    }

    pub(crate) fn missing(&self, key: &str) -> CourseError {
        CourseError::MissingAttribute {
            group: self.group.to_string(),
            feature: self.feature.clone(),
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(&self, key: &str, value: &str) -> CourseError {
        CourseError::InvalidAttributeValue {
            group: self.group.to_string(),
            feature: self.feature.clone(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn require<'b>(&self, attributes: &'b FeatureAttributes, key: &str) -> Result<&'b str> {
        attributes.get(key).ok_or_else(|| self.missing(key))
    }

    /// The `hidden` flag of a placemark
    pub(crate) fn hidden(&self, attributes: &FeatureAttributes) -> Result<bool> {
        let raw = self.require(attributes, "hidden")?;
        parse_hidden_flag(raw).ok_or_else(|| self.invalid("hidden", raw))
    }
}

/// First `lon,lat[,alt]` tuple of a KML coordinates string
fn parse_lon_lat(raw: &str) -> Option<(f64, f64)> {
    let tuple = raw.split_whitespace().next()?;
    let mut parts = tuple.split(',');
    let lon = parts.next()?.trim().parse().ok()?;
    let lat = parts.next()?.trim().parse().ok()?;
    Some((lon, lat))
}

fn extract_checkpoint(
    placemark: &Element,
    point: &Element,
    context: &FeatureContext<'_>,
    index: u32,
) -> Result<CheckPoint> {
    let attributes = FeatureAttributes::from_placemark(placemark);

    let raw_score = context.require(&attributes, "score")?;
    let score = parse_score(raw_score).ok_or_else(|| context.invalid("score", raw_score))?;

    let hint = context.require(&attributes, "hint")?;
    let hidden = context.hidden(&attributes)?;

    let raw_coordinates = point
        .child_text("coordinates")
        .ok_or_else(|| context.missing("coordinates"))?;
    let (longitude, latitude) = parse_lon_lat(&raw_coordinates)
        .ok_or_else(|| context.invalid("coordinates", &raw_coordinates))?;

    let coordinate = utils::to_projected(longitude, latitude);
    if !utils::is_within_rd_bounds(&coordinate) {
        tracing::warn!(
            "Group '{}', feature {}: {longitude},{latitude} lies outside the RD grid",
            context.group,
            context.feature
        );
    }

    CheckPoint::new(index, score, hint, hidden, coordinate)
}

/// Build a stage from a recognized stage group
fn extract_stage(folder: &Element, group: &str, name: StageName) -> Result<Stage> {
    let mut checkpoints = Vec::new();

    for placemark in folder.elements_named("Placemark") {
        let Some(point) = point_geometry(placemark) else {
            tracing::debug!("Group '{group}': skipping placemark without point geometry");
            continue;
        };

        // Document order defines the index; anything embedded in the feature is ignored
        let index = checkpoints.len() + 1;
        let context = FeatureContext::new(group, index, placemark);
        checkpoints.push(extract_checkpoint(placemark, point, &context, index as u32)?);
    }

    Stage::new(name.index, name.kind, checkpoints).map_err(|e| match e {
        CourseError::InvariantViolation(reason) => {
            CourseError::InvariantViolation(format!("group '{group}': {reason}"))
        }
        other => other,
    })
}

/// Extract all stages from a parsed KML document, in document order
///
/// Folders whose names are not stage group names are skipped along with
/// everything inside them.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn extract_stages(document: &KmlDocument, config: &Config) -> Result<Vec<Stage>> {
    let container = document.container()?;
    let mut stages = Vec::new();

    for folder in container.elements_named("Folder") {
        let group = group_name(folder);
        let Some(name) = StageName::parse(&group, config.group_delimiter)? else {
            tracing::debug!("Skipping group '{group}': not a stage group");
            continue;
        };
        stages.push(extract_stage(folder, &group, name)?);
    }

    Ok(stages)
}

/// Check the file extension of a stage document if the config asks for it
pub(crate) fn check_extension(path: &Path, config: &Config) -> Result<()> {
    let is_kml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"));

    if config.require_kml_extension && !is_kml {
        return Err(CourseError::UnsupportedDocumentShape(
            "expected a .kml file".to_string(),
        )
        .in_file(path));
    }
    Ok(())
}

/// Read a KML file and extract its stages
pub fn read_stages(path: impl AsRef<Path>, config: &Config) -> Result<Vec<Stage>> {
    let path = path.as_ref();
    check_extension(path, config)?;

    let document = KmlDocument::read(path)?;
    let stages = extract_stages(&document, config).map_err(|e| e.in_file(path))?;

    tracing::info!(
        "Extracted {} stage(s) with {} checkpoint(s) from {}",
        stages.len(),
        stages.iter().map(Stage::len).sum::<usize>(),
        path.display()
    );
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placemark(name: &str, data: &[(&str, &str)], coordinates: &str) -> String {
        let data: String = data
            .iter()
            .map(|(k, v)| format!(r#"<Data name="{k}"><value>{v}</value></Data>"#))
            .collect();
        format!(
            "<Placemark><name>{name}</name><ExtendedData>{data}</ExtendedData>\
             <Point><coordinates>{coordinates}</coordinates></Point></Placemark>"
        )
    }

    fn checkpoint(name: &str, score: &str, hidden: &str) -> String {
        placemark(
            name,
            &[("score", score), ("hint", name), ("hidden", hidden)],
            "5.38720621,52.15517440,0",
        )
    }

    fn folder(name: &str, body: &str) -> String {
        format!("<Folder><name>{name}</name>{body}</Folder>")
    }

    fn document(folders: &[String]) -> KmlDocument {
        let xml = format!(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document><name>Race</name>{}</Document></kml>"#,
            folders.concat()
        );
        KmlDocument::parse(&xml).unwrap()
    }

    #[test]
    fn test_stage_name_recognition() {
        let name = StageName::parse("Stage_4_cycling", '_').unwrap().unwrap();
        assert_eq!(name.index, 4);
        assert_eq!(name.kind, "cycling");

        assert_eq!(StageName::parse("Notes", '_').unwrap(), None);
        assert_eq!(StageName::parse("Stage_cycling", '_').unwrap(), None);
        assert_eq!(StageName::parse("Stage_4_run_bike", '_').unwrap(), None);

        assert!(is_stage_group("Stage_4_cycling", '_'));
        assert!(!is_stage_group("Stage_cycling", '_'));
        assert!(is_stage_group("Stage-2-kano", '-'));
    }

    #[test]
    fn test_stage_name_bad_index() {
        assert!(matches!(
            StageName::parse("Stage_four_cycling", '_'),
            Err(CourseError::InvalidStageIndex { .. })
        ));
        assert!(matches!(
            StageName::parse("Stage_0_cycling", '_'),
            Err(CourseError::InvalidStageIndex { .. })
        ));
    }

    #[test]
    fn test_extract_mixed_groups() {
        let doc = document(&[
            folder("Notes", &checkpoint("ignored", "1", "0")),
            folder(
                "Stage_2_cycling",
                &[checkpoint("a", "10", "0"), checkpoint("b", "20", "1")].concat(),
            ),
            folder("Stage_cycling", &checkpoint("ignored", "1", "0")),
            folder(
                "Stage_1_running",
                &[
                    checkpoint("c", "5", "0"),
                    checkpoint("d", "5", "0"),
                    checkpoint("e", "5", "0"),
                ]
                .concat(),
            ),
        ]);

        let stages = extract_stages(&doc, &Config::default()).unwrap();
        assert_eq!(stages.len(), 2);

        assert_eq!(stages[0].index(), 2);
        assert_eq!(stages[0].kind(), "cycling");
        assert_eq!(stages[0].len(), 2);
        assert!(stages[0].checkpoints().get(1).unwrap().hidden());

        assert_eq!(stages[1].index(), 1);
        assert_eq!(stages[1].kind(), "running");
        assert_eq!(stages[1].len(), 3);
    }

    #[test]
    fn test_checkpoint_fields() {
        let body = [
            placemark(
                "cp",
                &[("Score", "12.7"), ("HINT", "Under the bridge"), ("Hidden", "1")],
                "5.38720621,52.15517440,3.5",
            ),
            checkpoint("b", "1", "0"),
        ]
        .concat();
        let doc = document(&[folder("Stage_3_kano", &body)]);

        let stages = extract_stages(&doc, &Config::default()).unwrap();
        let cp = stages[0].checkpoints().get(0).unwrap();
        assert_eq!(cp.index(), 1);
        assert_eq!(cp.score(), 12);
        assert_eq!(cp.hint(), "Under the bridge");
        assert!(cp.hidden());
        assert_eq!(cp.coordinate().x(), 155000);
        assert_eq!(cp.coordinate().y(), 463000);
    }

    #[test]
    fn test_indices_follow_document_order() {
        // Names suggest a different order, extraction must ignore them
        let body = [
            checkpoint("CP3", "1", "0"),
            checkpoint("CP1", "1", "0"),
            checkpoint("CP2", "1", "0"),
        ]
        .concat();
        let doc = document(&[folder("Stage_1_running", &body)]);

        let stages = extract_stages(&doc, &Config::default()).unwrap();
        let indices: Vec<u32> = stages[0].iter().map(CheckPoint::index).collect();
        let hints: Vec<&str> = stages[0].iter().map(CheckPoint::hint).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(hints, vec!["CP3", "CP1", "CP2"]);
    }

    #[test]
    fn test_schema_data_attributes() {
        let simple = r##"<Placemark><name>s</name><ExtendedData><SchemaData schemaUrl="#cp">
            <SimpleData name="score">3</SimpleData>
            <SimpleData name="hint">Tree</SimpleData>
            <SimpleData name="hidden">0</SimpleData>
            </SchemaData></ExtendedData><Point><coordinates>5.4,52.1</coordinates></Point></Placemark>"##;
        let body = [simple.to_string(), checkpoint("b", "1", "0")].concat();
        let doc = document(&[folder("Stage_1_running", &body)]);

        let stages = extract_stages(&doc, &Config::default()).unwrap();
        let cp = stages[0].checkpoints().get(0).unwrap();
        assert_eq!(cp.score(), 3);
        assert_eq!(cp.hint(), "Tree");
        assert!(!cp.hidden());
    }

    #[test]
    fn test_non_point_placemarks_skipped() {
        let line = "<Placemark><name>route</name><LineString><coordinates>5.1,52.1 5.2,52.2</coordinates></LineString></Placemark>";
        let body = [
            checkpoint("a", "1", "0"),
            line.to_string(),
            checkpoint("b", "1", "0"),
        ]
        .concat();
        let doc = document(&[folder("Stage_1_running", &body)]);

        let stages = extract_stages(&doc, &Config::default()).unwrap();
        let indices: Vec<u32> = stages[0].iter().map(CheckPoint::index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_missing_attribute_is_fatal() {
        let body = [
            checkpoint("a", "1", "0"),
            placemark("b", &[("score", "1"), ("hint", "x")], "5.1,52.1"),
        ]
        .concat();
        let doc = document(&[folder("Stage_1_running", &body)]);

        match extract_stages(&doc, &Config::default()) {
            Err(CourseError::MissingAttribute {
                group,
                feature,
                key,
            }) => {
                assert_eq!(group, "Stage_1_running");
                assert_eq!(feature, "#2 'b'");
                assert_eq!(key, "hidden");
            }
            other => panic!("expected missing attribute, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let bad_score = [
            placemark("a", &[("score", "lots"), ("hint", "x"), ("hidden", "0")], "5.1,52.1"),
            checkpoint("b", "1", "0"),
        ]
        .concat();
        let doc = document(&[folder("Stage_1_running", &bad_score)]);
        assert!(matches!(
            extract_stages(&doc, &Config::default()),
            Err(CourseError::InvalidAttributeValue { ref key, .. }) if key == "score"
        ));

        let bad_coordinates = [
            checkpoint("a", "1", "0"),
            placemark("b", &[("score", "1"), ("hint", "x"), ("hidden", "0")], "here"),
        ]
        .concat();
        let doc = document(&[folder("Stage_1_running", &bad_coordinates)]);
        assert!(matches!(
            extract_stages(&doc, &Config::default()),
            Err(CourseError::InvalidAttributeValue { ref key, .. }) if key == "coordinates"
        ));
    }

    #[test]
    fn test_unparseable_hidden_flag_is_fatal() {
        let body = [
            checkpoint("a", "1", "0"),
            checkpoint("b", "1", "yes"),
        ]
        .concat();
        let doc = document(&[folder("Stage_1_running", &body)]);

        match extract_stages(&doc, &Config::default()) {
            Err(CourseError::InvalidAttributeValue {
                group,
                feature,
                key,
                value,
            }) => {
                assert_eq!(group, "Stage_1_running");
                assert_eq!(feature, "#2 'b'");
                assert_eq!(key, "hidden");
                assert_eq!(value, "yes");
            }
            other => panic!("expected invalid attribute value, got {other:?}"),
        }
    }

    #[test]
    fn test_single_checkpoint_stage_is_fatal() {
        let doc = document(&[folder("Stage_1_running", &checkpoint("a", "1", "0"))]);
        match extract_stages(&doc, &Config::default()) {
            Err(CourseError::InvariantViolation(reason)) => {
                assert!(reason.contains("Stage_1_running"));
            }
            other => panic!("expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_groups_are_not_validated() {
        // Broken content inside a non-stage folder must not matter
        let broken = placemark("x", &[], "nowhere");
        let doc = document(&[folder("Notes", &broken)]);
        let stages = extract_stages(&doc, &Config::default()).unwrap();
        assert!(stages.is_empty());
    }

    #[test]
    fn test_parse_lon_lat() {
        assert_eq!(parse_lon_lat("5.1,52.2,0"), Some((5.1, 52.2)));
        assert_eq!(parse_lon_lat(" 5.1, 52.2 "), None);
        assert_eq!(parse_lon_lat("5.1,52.2 6.0,53.0"), Some((5.1, 52.2)));
        assert_eq!(parse_lon_lat("5.1"), None);
        assert_eq!(parse_lon_lat(""), None);
    }

    #[test]
    fn test_read_stages_checks_extension() {
        let err = read_stages("course.gpx", &Config::default()).unwrap_err();
        assert!(matches!(err.root(), CourseError::UnsupportedDocumentShape(_)));
    }
}
