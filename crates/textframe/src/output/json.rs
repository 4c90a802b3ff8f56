use std::path::PathBuf;

use textframe_types::KeyframeRecord;
use tokio::fs;

use crate::output::error::OutputError;

/// Writes the collected keyframe records to a single JSON file alongside
/// the images.
pub struct RecordsOutput {
    directory: PathBuf,
    filename: String,
    pretty: bool,
}

impl RecordsOutput {
    pub fn new(directory: PathBuf, filename: String, pretty: bool) -> Self {
        Self {
            directory,
            filename,
            pretty,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    pub async fn write(&self, records: &[KeyframeRecord]) -> Result<(), OutputError> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(records)?
        } else {
            serde_json::to_vec(records)?
        };
        let path = self.path();
        fs::write(&path, encoded)
            .await
            .map_err(|err| OutputError::records_write(path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = RecordsOutput::new(
            dir.path().to_path_buf(),
            "keyframes.json".to_string(),
            false,
        );
        let records = vec![KeyframeRecord {
            frame_index: 480,
            timestamp: 20.0,
            source_video: "input.mp4".to_string(),
            image_path: dir.path().join("frame_00480.jpg"),
        }];
        output.write(&records).await.unwrap();

        let contents = std::fs::read_to_string(output.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["frame_index"], 480);
        assert_eq!(parsed[0]["source_video"], "input.mp4");
    }

    #[tokio::test]
    async fn empty_record_set_still_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = RecordsOutput::new(
            dir.path().to_path_buf(),
            "keyframes.json".to_string(),
            true,
        );
        output.write(&[]).await.unwrap();
        let contents = std::fs::read_to_string(output.path()).unwrap();
        assert_eq!(contents.trim(), "[]");
    }
}
