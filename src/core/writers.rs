//! Data writers for PCD, PLY and CSV formats.
//!
//! This module provides functions for writing labeled point clouds:
//! - PCD (ASCII) with the label in an `intensity` field, readable by PCL tools
//! - PLY (ASCII) with an unsigned `label` property
//! - CSV with decoded semantic class and instance columns

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::labels::SemanticLabel;
use super::loaders::PointCloud;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
pub(crate) fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write the header lines, then one line per point formatted by `row`.
fn write_text<F>(path: &Path, header: &[String], cloud: &PointCloud, row: F) -> Result<()>
where
    F: Fn(&mut BufWriter<File>, usize) -> std::io::Result<()>,
{
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    let write_err = |e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    };

    for line in header {
        writeln!(writer, "{}", line).map_err(write_err)?;
    }
    for i in 0..cloud.len() {
        row(&mut writer, i).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    Ok(())
}

/// Write a labeled point cloud to an ASCII PCD file.
///
/// Fields are `x y z intensity`; the packed label is written as an integer
/// value in the `intensity` column, so it reads back exactly.
///
/// # Errors
///
/// Returns an error if parent directories or the file cannot be created or
/// written.
///
/// # Example
///
/// ```no_run
/// use map_complement::core::loaders::PointCloud;
/// use map_complement::core::writers::write_pcd;
/// use std::path::Path;
///
/// let cloud = PointCloud::default();
/// write_pcd(Path::new("complement.pcd"), &cloud).unwrap();
/// ```
pub fn write_pcd(path: &Path, cloud: &PointCloud) -> Result<()> {
    let n = cloud.len();
    let header = vec![
        "# .PCD v0.7 - Point Cloud Data file format".to_string(),
        "VERSION 0.7".to_string(),
        "FIELDS x y z intensity".to_string(),
        "SIZE 4 4 4 4".to_string(),
        "TYPE F F F F".to_string(),
        "COUNT 1 1 1 1".to_string(),
        format!("WIDTH {}", n),
        "HEIGHT 1".to_string(),
        "VIEWPOINT 0 0 0 1 0 0 0".to_string(),
        format!("POINTS {}", n),
        "DATA ascii".to_string(),
    ];

    write_text(path, &header, cloud, |w, i| {
        writeln!(
            w,
            "{} {} {} {}",
            cloud.x[i], cloud.y[i], cloud.z[i], cloud.labels[i]
        )
    })
}

/// Write a labeled point cloud to an ASCII PLY file with a `label` property.
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    let header = vec![
        "ply".to_string(),
        "format ascii 1.0".to_string(),
        format!("element vertex {}", cloud.len()),
        "property float x".to_string(),
        "property float y".to_string(),
        "property float z".to_string(),
        "property uint label".to_string(),
        "end_header".to_string(),
    ];

    write_text(path, &header, cloud, |w, i| {
        writeln!(
            w,
            "{:.6} {:.6} {:.6} {}",
            cloud.x[i], cloud.y[i], cloud.z[i], cloud.labels[i]
        )
    })
}

/// Write a point cloud to CSV with decoded labels.
///
/// Columns: `x,y,z,semantic,instance`.
pub fn write_labels_csv(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;

    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer
        .write_record(["x", "y", "z", "semantic", "instance"])
        .map_err(csv_err)?;

    for point in cloud.iter() {
        let label = SemanticLabel::decode(point.label);
        csv_writer
            .write_record(&[
                format!("{:.6}", point.x),
                format!("{:.6}", point.y),
                format!("{:.6}", point.z),
                label.semantic_class.to_string(),
                label.instance_id.to_string(),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

/// Write a cloud in the format implied by the file extension (`.ply`, `.csv`,
/// otherwise PCD).
pub fn write_cloud(path: &Path, cloud: &PointCloud) -> Result<()> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("ply") => write_ply(path, cloud),
        Some("csv") => write_labels_csv(path, cloud),
        _ => write_pcd(path, cloud),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{load_cloud, LabeledPoint};
    use std::fs;
    use tempfile::tempdir;

    fn create_test_cloud() -> PointCloud {
        PointCloud {
            x: vec![1.0, 2.0, 3.0],
            y: vec![4.0, 5.0, 6.0],
            z: vec![7.0, 8.0, 9.0],
            labels: vec![40, 252, (300 << 16) | 48],
        }
    }

    #[test]
    fn test_write_pcd_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pcd");

        write_pcd(&path, &create_test_cloud()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[2], "FIELDS x y z intensity");
        assert_eq!(lines[9], "POINTS 3");
        assert_eq!(lines[10], "DATA ascii");
        assert_eq!(lines.len(), 14);
    }

    #[test]
    fn test_pcd_labels_read_back_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.pcd");
        let cloud = create_test_cloud();

        write_pcd(&path, &cloud).unwrap();
        let loaded = load_cloud(&path).unwrap();

        // instance 300 pushes the label past f32's exact integer range
        assert_eq!(loaded.labels, cloud.labels);
        assert_eq!(loaded.point(0), LabeledPoint::new(1.0, 4.0, 7.0, 40));
    }

    #[test]
    fn test_write_ply_with_label() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.ply");

        write_ply(&path, &create_test_cloud()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[2], "element vertex 3");
        assert_eq!(lines[6], "property uint label");
        assert_eq!(lines[7], "end_header");
        assert!(lines[9].ends_with(" 252"));

        let loaded = load_cloud(&path).unwrap();
        assert_eq!(loaded.labels, create_test_cloud().labels);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("test.pcd");

        write_cloud(&path, &create_test_cloud()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_write_labels_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");

        write_cloud(&path, &create_test_cloud()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "x,y,z,semantic,instance");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].ends_with(",252,0"));
        assert!(lines[3].ends_with(",48,300"));
    }

    #[test]
    fn test_write_empty_cloud() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.pcd");

        write_pcd(&path, &PointCloud::new()).unwrap();
        let loaded = load_cloud(&path).unwrap();
        assert!(loaded.is_empty());
    }
}
