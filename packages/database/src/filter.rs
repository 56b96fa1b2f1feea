//! Query filters and dotted-path partial updates.
//!
//! Both store implementations evaluate filters in process, so matching
//! and update semantics are identical regardless of backend.

use geo::{BoundingRect, Intersects, MultiPolygon, Rect};
use serde_json::{Map, Value};

/// Selects documents in a collection.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every document.
    All,
    /// The value at a dotted path equals the given value.
    Eq(String, Value),
    /// The `GeoJSON` geometry at a dotted path intersects the polygons.
    Intersects(String, MultiPolygon<f64>),
    /// All sub-filters match.
    And(Vec<Self>),
}

impl Filter {
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    #[must_use]
    pub fn intersects(path: impl Into<String>, geometry: &MultiPolygon<f64>) -> Self {
        Self::Intersects(path.into(), geometry.clone())
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Whether `document` satisfies this filter.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(path, expected) => get_path(document, path) == Some(expected),
            Self::Intersects(path, query) => get_path(document, path)
                .and_then(parse_polygons)
                .is_some_and(|stored| polygons_intersect(&stored, query)),
            Self::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }

    /// Equality constraints, used to seed a document created by an upsert.
    fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Self::Eq(path, value) => vec![(path.as_str(), value)],
            Self::And(filters) => filters.iter().flat_map(Self::equalities).collect(),
            Self::All | Self::Intersects(..) => Vec::new(),
        }
    }
}

/// A set of `$set`-style assignments applied in order.
#[derive(Debug, Clone, Default)]
pub struct Update {
    assignments: Vec<(String, Value)>,
}

impl Update {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            assignments: Vec::new(),
        }
    }

    /// Assigns `value` at a dotted path, creating intermediate objects.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((path.into(), value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Applies every assignment to `document`.
    pub fn apply(&self, document: &mut Value) {
        for (path, value) in &self.assignments {
            set_path(document, path, value.clone());
        }
    }

    /// Builds the document an upsert inserts when nothing matched.
    #[must_use]
    pub fn seed(&self, filter: &Filter) -> Value {
        let mut document = Value::Object(Map::new());
        for (path, value) in filter.equalities() {
            set_path(&mut document, path, value.clone());
        }
        self.apply(&mut document);
        document
    }
}

/// Reads the value at a dotted path.
#[must_use]
pub fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, key| current.as_object()?.get(key))
}

/// Writes `value` at a dotted path. Missing or non-object intermediates
/// are replaced with empty objects.
pub fn set_path(document: &mut Value, path: &str, value: Value) {
    let mut current = document;
    let mut keys = path.split('.').peekable();

    while let Some(key) = keys.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };

        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return;
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn parse_polygons(value: &Value) -> Option<MultiPolygon<f64>> {
    let geometry = geojson::Geometry::from_json_value(value.clone()).ok()?;
    match geo::Geometry::<f64>::try_from(geometry).ok()? {
        geo::Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Some(multi),
        _ => None,
    }
}

fn polygons_intersect(stored: &MultiPolygon<f64>, query: &MultiPolygon<f64>) -> bool {
    match (stored.bounding_rect(), query.bounding_rect()) {
        (Some(a), Some(b)) if rects_overlap(&a, &b) => stored.intersects(query),
        _ => false,
    }
}

fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x
        && b.min().x <= a.max().x
        && a.min().y <= b.max().y
        && b.min().y <= a.max().y
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use serde_json::json;

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    #[test]
    fn set_path_creates_intermediates() {
        let mut doc = json!({"project_id": "p1"});
        set_path(&mut doc, "etl_layers.soil", json!({"status": "ok"}));
        set_path(&mut doc, "etl_layers.dem", json!({"status": "failed"}));
        assert_eq!(doc["etl_layers"]["soil"]["status"], "ok");
        assert_eq!(doc["etl_layers"]["dem"]["status"], "failed");
        assert_eq!(doc["project_id"], "p1");
    }

    #[test]
    fn set_path_replaces_scalar_intermediate() {
        let mut doc = json!({"a": 5});
        set_path(&mut doc, "a.b", json!(1));
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn eq_filter_reads_dotted_paths() {
        let doc = json!({"region": {"country": "USA"}});
        assert!(Filter::eq("region.country", "USA").matches(&doc));
        assert!(!Filter::eq("region.country", "CAN").matches(&doc));
        assert!(!Filter::eq("missing.path", "USA").matches(&doc));
    }

    #[test]
    fn intersects_filter_uses_stored_geojson() {
        let doc = json!({
            "code": "AAA",
            "geometry": {
                "type": "MultiPolygon",
                "coordinates": [[[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]]
            }
        });
        assert!(Filter::intersects("geometry", &square(5.0, 5.0, 1.0)).matches(&doc));
        assert!(Filter::intersects("geometry", &square(9.5, 9.5, 2.0)).matches(&doc));
        assert!(!Filter::intersects("geometry", &square(20.0, 20.0, 1.0)).matches(&doc));
        assert!(!Filter::intersects("nothing", &square(5.0, 5.0, 1.0)).matches(&doc));
    }

    #[test]
    fn upsert_seed_combines_filter_and_update() {
        let filter = Filter::eq("project_id", "p1");
        let update = Update::new().set("etl_layers.dem", json!({"status": "ok"}));
        let seeded = update.seed(&filter);
        assert_eq!(seeded, json!({"project_id": "p1", "etl_layers": {"dem": {"status": "ok"}}}));
    }
}
