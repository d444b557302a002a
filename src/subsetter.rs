use std::collections::HashSet;
use std::fs::{create_dir_all, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::algorithm::map_coords::MapCoords;
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry as GeoJsonGeometry, JsonObject, Value as GeoJsonValue};
use proj::Proj;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use tracing::{debug, info, warn};

use crate::error::SubsetError;

/// Axis-aligned bounding box in lon/lat order (min_x, min_y, max_x, max_y).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Bbox { min_x, min_y, max_x, max_y }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new((self.min_x, self.min_y), (self.max_x, self.max_y)).to_polygon()
    }
}

/// How to interpret the coordinates of an input file.
///
/// `Keep` trusts the file as-is and skips reprojection entirely; `Epsg(4326)`
/// is likewise a no-op since outputs are always WGS84. Any other EPSG code is
/// reprojected to 4326 before spatial filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsSpec {
    Keep,
    Epsg(u32),
}

impl std::str::FromStr for CrsSpec {
    type Err = SubsetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("no") {
            return Ok(CrsSpec::Keep);
        }
        trimmed
            .parse::<u32>()
            .map(CrsSpec::Epsg)
            .map_err(|_| SubsetError::Crs(s.to_string()))
    }
}

/// A feature loaded from a GeoJSON file: its geometry plus the attribute
/// columns carried in the feature's `properties` object.
#[derive(Debug, Clone)]
pub struct SubsetFeature {
    pub geometry: Geometry<f64>,
    pub properties: JsonObject,
}

/// Parameters for subsetting a single file.
#[derive(Debug, Clone)]
pub struct SubsetRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub bbox: Bbox,
    pub prefix: String,
    /// Property columns to keep; empty keeps everything.
    pub columns: Vec<String>,
    pub crs: CrsSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsetSummary {
    pub output_path: PathBuf,
    pub features_written: usize,
}

// Function to load features (geometry + properties) from a GeoJSON file
pub fn load_features(file_path: &Path) -> Result<Vec<SubsetFeature>, SubsetError> {
    debug!(path = %file_path.display(), "loading file");
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader)?;
    let mut features = Vec::new();

    if let GeoJson::FeatureCollection(fc) = geojson {
        let total_features = fc.features.len();

        for feature in fc.features {
            let properties = feature.properties.unwrap_or_default();
            if let Some(geometry) = feature.geometry {
                if let Some(geometry) = from_geojson_value(geometry.value) {
                    features.push(SubsetFeature { geometry, properties });
                }
            }
        }

        if features.len() < total_features {
            warn!(
                skipped = total_features - features.len(),
                path = %file_path.display(),
                "skipped features with missing, malformed or unsupported geometry"
            );
        }
    }

    info!(features = features.len(), path = %file_path.display(), "loaded features");
    Ok(features)
}

fn from_geojson_value(value: GeoJsonValue) -> Option<Geometry<f64>> {
    match value {
        GeoJsonValue::Point(pos) => {
            coord_from_position(&pos).map(|c| Geometry::Point(Point::from(c)))
        }
        GeoJsonValue::MultiPoint(positions) => {
            let points: Option<Vec<Point<f64>>> = positions
                .iter()
                .map(|pos| coord_from_position(pos).map(Point::from))
                .collect();
            points.map(|points| Geometry::MultiPoint(MultiPoint::new(points)))
        }
        GeoJsonValue::LineString(coords) => {
            line_string_from_positions(&coords).map(Geometry::LineString)
        }
        GeoJsonValue::MultiLineString(lines) => {
            let lines: Option<Vec<LineString<f64>>> =
                lines.iter().map(|l| line_string_from_positions(l)).collect();
            lines.map(|lines| Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        GeoJsonValue::Polygon(rings) => polygon_from_rings(&rings).map(Geometry::Polygon),
        GeoJsonValue::MultiPolygon(polygons) => {
            let polygons: Option<Vec<Polygon<f64>>> = polygons
                .iter()
                .map(|rings| polygon_from_rings(rings))
                .collect();
            polygons.map(|polygons| Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        _ => None,
    }
}

// A valid GeoJSON position carries at least two ordinates; altitude and
// anything beyond is dropped.
fn coord_from_position(position: &[f64]) -> Option<Coord<f64>> {
    match position {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn line_string_from_positions(positions: &[Vec<f64>]) -> Option<LineString<f64>> {
    positions
        .iter()
        .map(|pos| coord_from_position(pos))
        .collect::<Option<Vec<Coord<f64>>>>()
        .map(LineString::new)
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let exterior = line_string_from_positions(rings.first()?)?;
    let holes: Option<Vec<LineString<f64>>> = rings
        .iter()
        .skip(1)
        .map(|ring| line_string_from_positions(ring))
        .collect();
    Some(Polygon::new(exterior, holes?))
}

/// Keep only the named property columns on every feature.
///
/// An empty selection keeps all columns. Requesting a column that a feature
/// does not carry is an error, so a typo in a batch table fails loudly instead
/// of silently producing an empty dashboard layer. The name `geometry` is
/// accepted and ignored: in GeoJSON the geometry is not a property.
pub fn select_columns(
    features: Vec<SubsetFeature>,
    columns: &[String],
    file_path: &Path,
) -> Result<Vec<SubsetFeature>, SubsetError> {
    if columns.is_empty() {
        return Ok(features);
    }

    debug!(columns = ?columns, "selecting property columns");

    features
        .into_iter()
        .map(|feature| {
            let mut properties = JsonObject::new();
            for column in columns {
                if column == "geometry" {
                    continue;
                }
                match feature.properties.get(column) {
                    Some(value) => {
                        properties.insert(column.clone(), value.clone());
                    }
                    None => {
                        return Err(SubsetError::MissingColumn {
                            column: column.clone(),
                            path: file_path.to_path_buf(),
                        });
                    }
                }
            }
            Ok(SubsetFeature { properties, ..feature })
        })
        .collect()
}

/// Reproject every geometry from the given EPSG code to WGS84 (EPSG:4326).
pub fn reproject_features(
    features: Vec<SubsetFeature>,
    epsg: u32,
) -> Result<Vec<SubsetFeature>, SubsetError> {
    let transform = Proj::new_known_crs(&format!("EPSG:{epsg}"), "EPSG:4326", None)
        .map_err(|source| SubsetError::ProjSetup { epsg, source })?;
    debug!(from_epsg = epsg, "reprojecting to EPSG:4326");

    features
        .into_iter()
        .map(|feature| {
            let geometry = feature.geometry.try_map_coords(|coord| {
                let (x, y) = transform.convert((coord.x, coord.y))?;
                Ok::<_, SubsetError>(Coord { x, y })
            })?;
            Ok(SubsetFeature { geometry, ..feature })
        })
        .collect()
}

type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Keep only features whose geometry lies strictly within the bounding box.
///
/// An R-tree over feature envelopes prunes the candidate set before the exact
/// containment test; features touching the box boundary are excluded.
pub fn filter_within(features: Vec<SubsetFeature>, bbox: &Bbox) -> Vec<SubsetFeature> {
    let envelopes: Vec<IndexedEnvelope> = features
        .iter()
        .enumerate()
        .filter_map(|(idx, feature)| {
            feature.geometry.bounding_rect().map(|rect| {
                GeomWithData::new(
                    Rectangle::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    idx,
                )
            })
        })
        .collect();
    let tree = RTree::bulk_load(envelopes);

    let query = AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]);
    let candidates: HashSet<usize> = tree
        .locate_in_envelope_intersecting(&query)
        .map(|entry| entry.data)
        .collect();

    let boundary = bbox.to_polygon();
    let total = features.len();
    let kept: Vec<SubsetFeature> = features
        .into_iter()
        .enumerate()
        .filter(|(idx, feature)| candidates.contains(idx) && boundary.contains(&feature.geometry))
        .map(|(_, feature)| feature)
        .collect();

    debug!(kept = kept.len(), total, "filtered features by bounding box");
    kept
}

fn to_geojson_value(geometry: &Geometry<f64>) -> GeoJsonValue {
    match geometry {
        Geometry::Point(point) => GeoJsonValue::Point(vec![point.x(), point.y()]),
        Geometry::MultiPoint(points) => {
            GeoJsonValue::MultiPoint(points.iter().map(|p| vec![p.x(), p.y()]).collect())
        }
        Geometry::Line(line) => GeoJsonValue::LineString(vec![
            vec![line.start.x, line.start.y],
            vec![line.end.x, line.end.y],
        ]),
        Geometry::LineString(line) => GeoJsonValue::LineString(ring_positions(line)),
        Geometry::MultiLineString(lines) => {
            GeoJsonValue::MultiLineString(lines.iter().map(ring_positions).collect())
        }
        Geometry::Polygon(polygon) => GeoJsonValue::Polygon(polygon_rings(polygon)),
        Geometry::MultiPolygon(polygons) => {
            GeoJsonValue::MultiPolygon(polygons.iter().map(polygon_rings).collect())
        }
        Geometry::Rect(rect) => GeoJsonValue::Polygon(polygon_rings(&rect.to_polygon())),
        Geometry::Triangle(triangle) => {
            GeoJsonValue::Polygon(polygon_rings(&triangle.to_polygon()))
        }
        Geometry::GeometryCollection(collection) => GeoJsonValue::GeometryCollection(
            collection
                .iter()
                .map(|g| GeoJsonGeometry::new(to_geojson_value(g)))
                .collect(),
        ),
    }
}

fn ring_positions(line: &LineString<f64>) -> Vec<Vec<f64>> {
    line.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    let mut rings = vec![ring_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_positions));
    rings
}

pub fn write_feature_collection(
    features: &[SubsetFeature],
    output_path: &Path,
) -> Result<(), SubsetError> {
    let features: Vec<Feature> = features
        .iter()
        .map(|feature| Feature {
            bbox: None,
            geometry: Some(GeoJsonGeometry::new(to_geojson_value(&feature.geometry))),
            id: None,
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();

    let feature_collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, &feature_collection)?;

    Ok(())
}

/// Subset one GeoJSON file: select columns, reproject if needed, filter by
/// bounding box, and write `{prefix}_subset.geojson` into the output directory.
pub fn subset_file(request: &SubsetRequest) -> Result<SubsetSummary, SubsetError> {
    create_dir_all(&request.output_dir)?;

    let features = load_features(&request.input)?;
    let features = select_columns(features, &request.columns, &request.input)?;
    let features = match request.crs {
        CrsSpec::Keep | CrsSpec::Epsg(4326) => features,
        CrsSpec::Epsg(code) => reproject_features(features, code)?,
    };
    let kept = filter_within(features, &request.bbox);

    let output_path = request
        .output_dir
        .join(format!("{}_subset.geojson", request.prefix));
    write_feature_collection(&kept, &output_path)?;

    info!(
        features = kept.len(),
        path = %output_path.display(),
        "saved subset"
    );

    Ok(SubsetSummary {
        output_path,
        features_written: kept.len(),
    })
}
