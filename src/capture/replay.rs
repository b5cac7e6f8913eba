//! JSON-lines landmark recordings.
//!
//! Each line is one frame: `{"landmarks": [[x, y, z], ...]}`, a flat
//! `{"landmarks": [x0, y0, z0, ...]}`, or `{"landmarks": null}` for a
//! frame without a hand. Blank lines are skipped.

use crate::capture::types::{CaptureError, Frame, FrameSource};
use crate::core::normalize::KeypointSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Landmarks in either nested or flat layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedLandmarks {
    Points(Vec<[f64; 3]>),
    Flat(Vec<f64>),
}

impl RecordedLandmarks {
    pub fn into_keypoints(self) -> KeypointSet {
        match self {
            RecordedLandmarks::Points(points) => KeypointSet::new(points),
            RecordedLandmarks::Flat(values) => KeypointSet::from_flat(&values),
        }
    }
}

/// One line of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(default)]
    pub landmarks: Option<RecordedLandmarks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ReplayRecord {
    pub fn new(landmarks: Option<&KeypointSet>) -> Self {
        Self {
            landmarks: landmarks.map(|k| RecordedLandmarks::Points(k.points.clone())),
            captured_at: Some(Utc::now()),
        }
    }
}

/// Replays a recording line by line.
pub struct ReplaySource<R> {
    reader: R,
    index: u64,
    line: String,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, std::io::Error> {
        Ok(Self::from_reader(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            index: 0,
            line: String::new(),
        }
    }

    /// Frames read so far.
    pub fn position(&self) -> u64 {
        self.index
    }
}

impl<R: BufRead + Send> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| CaptureError::Transient(e.to_string()))?;
            if read == 0 {
                return Err(CaptureError::Closed);
            }
            if !self.line.trim().is_empty() {
                break;
            }
        }

        let index = self.index;
        self.index += 1;
        let record: ReplayRecord = serde_json::from_str(self.line.trim())
            .map_err(|e| CaptureError::Transient(format!("line {}: {e}", index + 1)))?;

        let mut frame =
            Frame::from_landmarks(record.landmarks.map(RecordedLandmarks::into_keypoints))
            .with_index(index);
        if let Some(at) = record.captured_at {
            frame.captured_at = at;
        }
        Ok(Some(frame))
    }
}

/// Write frames as a recording.
pub fn write_recording<W: Write>(
    mut writer: W,
    frames: &[Option<KeypointSet>],
) -> Result<(), std::io::Error> {
    for landmarks in frames {
        let line = serde_json::to_string(&ReplayRecord::new(landmarks.as_ref()))
            .map_err(std::io::Error::other)?;
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::tests::sample_hand;
    use std::io::Cursor;

    #[test]
    fn test_reads_both_layouts_and_gaps() {
        let hand = sample_hand((0.5, 0.5), 1.0);
        let flat = serde_json::to_string(&hand.flatten()).unwrap();
        let input = format!(
            "{}\n\n{{\"landmarks\": null}}\n{{\"landmarks\": {flat}}}\n",
            serde_json::to_string(&ReplayRecord::new(Some(&hand))).unwrap()
        );
        let mut source = ReplaySource::from_reader(Cursor::new(input));

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.landmarks.as_ref(), Some(&hand));
        assert_eq!(first.index, 0);

        let gap = source.next_frame().unwrap().unwrap();
        assert!(gap.landmarks.is_none());

        let third = source.next_frame().unwrap().unwrap();
        assert_eq!(third.landmarks.as_ref(), Some(&hand));
        assert_eq!(third.index, 2);

        assert_eq!(source.next_frame().unwrap_err(), CaptureError::Closed);
    }

    #[test]
    fn test_bad_line_is_transient() {
        let mut source =
            ReplaySource::from_reader(Cursor::new("not json\n{\"landmarks\": null}\n"));
        assert!(matches!(source.next_frame(), Err(CaptureError::Transient(_))));
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_write_then_replay() {
        let hand = sample_hand((0.3, 0.7), 1.2);
        let mut buf = Vec::new();
        write_recording(&mut buf, &[Some(hand.clone()), None]).unwrap();

        let mut source = ReplaySource::from_reader(Cursor::new(buf));
        assert_eq!(source.next_frame().unwrap().unwrap().landmarks, Some(hand));
        assert_eq!(source.next_frame().unwrap().unwrap().landmarks, None);
        assert_eq!(source.position(), 2);
    }
}
