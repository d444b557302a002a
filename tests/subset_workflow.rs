use std::fs;
use std::path::Path;

use geo::{Geometry, Point};
use gis_subsetter::{load_features, subset_from_table, write_feature_collection};
use serde_json::json;
use tempfile::tempdir;

fn crime_feature(id: u64, crime_type: &str, location: &str, x: f64, y: f64) -> gis_subsetter::SubsetFeature {
    let properties = [
        ("crime_id".to_string(), json!(id)),
        ("crime_type".to_string(), json!(crime_type)),
        ("location".to_string(), json!(location)),
        ("date".to_string(), json!("2023-01-01")),
    ]
    .into_iter()
    .collect();

    gis_subsetter::SubsetFeature {
        geometry: Geometry::Point(Point::new(x, y)),
        properties,
    }
}

fn write_crime_data(path: &Path) {
    let features = vec![
        crime_feature(1, "Theft", "Park A", -1.75, 53.80),
        crime_feature(2, "Assault", "Street B", -1.71, 53.81),
        crime_feature(3, "Burglary", "Park A", -1.74, 53.815),
        crime_feature(4, "Vandalism", "Mall C", -1.90, 53.85),
        crime_feature(5, "Theft", "Park A", -1.60, 53.75),
    ];
    write_feature_collection(&features, path).unwrap();
}

#[test]
fn end_to_end_batch_workflow() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("crime_data.geojson");
    write_crime_data(&input);

    let table = dir.path().join("workflow_config.csv");
    fs::write(
        &table,
        format!(
            "input_file,output_dir,minx,miny,maxx,maxy,file_prefix,crs,columns_to_keep\n\
             {},{},-1.772833,53.797893,-1.703482,53.819777,filtered_crime,4326,\"['crime_type' 'location' 'geometry']\"\n",
            input.display(),
            dir.path().display(),
        ),
    )
    .unwrap();

    let summaries = subset_from_table(&table).unwrap();
    assert_eq!(summaries.len(), 1);

    let output = dir.path().join("filtered_crime_subset.geojson");
    assert!(output.exists());
    assert_eq!(summaries[0].output_path, output);
    assert_eq!(summaries[0].features_written, 3);

    let result = load_features(&output).unwrap();
    assert_eq!(result.len(), 3);

    for feature in &result {
        assert!(feature.properties.contains_key("crime_type"));
        assert!(feature.properties.contains_key("location"));
        assert!(!feature.properties.contains_key("crime_id"));
        assert!(!feature.properties.contains_key("date"));

        let Geometry::Point(point) = &feature.geometry else {
            panic!("expected point geometry");
        };
        assert!(point.x() >= -1.772833 && point.x() <= -1.703482);
        assert!(point.y() >= 53.797893 && point.y() <= 53.819777);
    }
}

#[test]
fn batch_workflow_processes_multiple_rows() {
    let dir = tempdir().unwrap();

    for name in ["file1.geojson", "file2.geojson"] {
        write_crime_data(&dir.path().join(name));
    }

    let table = dir.path().join("config.csv");
    fs::write(
        &table,
        format!(
            "input_file,output_dir,minx,miny,maxx,maxy,file_prefix,crs,columns_to_keep\n\
             {base}/file1.geojson,{base},-1.772833,53.797893,-1.703482,53.819777,output1,4326,\"['crime_id' 'crime_type' 'geometry']\"\n\
             {base}/file2.geojson,{base},-1.772833,53.797893,-1.703482,53.819777,output2,4326,\"['crime_id' 'geometry']\"\n",
            base = dir.path().display(),
        ),
    )
    .unwrap();

    let summaries = subset_from_table(&table).unwrap();
    assert_eq!(summaries.len(), 2);

    let first = load_features(&dir.path().join("output1_subset.geojson")).unwrap();
    let second = load_features(&dir.path().join("output2_subset.geojson")).unwrap();

    assert_eq!(first.len(), 3);
    assert!(first[0].properties.contains_key("crime_type"));
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].properties.len(), 1);
}

#[test]
fn batch_workflow_fails_on_unknown_column() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("crime_data.geojson");
    write_crime_data(&input);

    let table = dir.path().join("bad_config.csv");
    fs::write(
        &table,
        format!(
            "input_file,output_dir,minx,miny,maxx,maxy,file_prefix,crs,columns_to_keep\n\
             {},{},-1.772833,53.797893,-1.703482,53.819777,broken,4326,\"['no_such_column']\"\n",
            input.display(),
            dir.path().display(),
        ),
    )
    .unwrap();

    let err = subset_from_table(&table).unwrap_err();
    assert!(err.to_string().contains("no_such_column"));
}
