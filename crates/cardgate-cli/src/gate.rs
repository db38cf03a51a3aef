//! Registration and access workflows: store lookup, capture, match, evidence.

use cardgate_core::{EncodeError, Embedding, EuclideanMatcher, FaceEncoder, Matcher};
use cardgate_hw::{CameraError, Frame, FrameSource};
use cardgate_store::{CardRecord, CardStore, StoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REGISTRATION_PHOTO: &str = "registration_photo.jpg";
pub const ACCESS_PHOTO: &str = "authentication_photo.jpg";

#[derive(Error, Debug)]
pub enum GateError {
    #[error("database: {0}")]
    Store(#[from] StoreError),
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("face encoding: {0}")]
    Encode(#[from] EncodeError),
}

/// Directories the gate writes photos into.
#[derive(Debug, Clone)]
pub struct PhotoDirs {
    pub registration: PathBuf,
    pub access: PathBuf,
    pub fraud: PathBuf,
}

/// Card details typed in by the user.
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub card_number: String,
    pub cvv: String,
    pub expiry_date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    Registered { record: CardRecord },
    NoFace,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccessOutcome {
    /// The database has no records at all.
    NoUsers,
    /// No record matches the card details.
    NotFound,
    Granted { record: CardRecord, distance: f32 },
    /// Card details matched but the face did not. `evidence` is the snapshot
    /// written to the fraud directory, if one could be taken.
    Denied {
        face_detected: bool,
        distance: Option<f32>,
        evidence: Option<PathBuf>,
    },
}

pub struct Gate<S, E> {
    store: CardStore,
    camera: S,
    encoder: E,
    matcher: EuclideanMatcher,
    dirs: PhotoDirs,
}

impl<S: FrameSource, E: FaceEncoder> Gate<S, E> {
    pub fn new(store: CardStore, camera: S, encoder: E, tolerance: f32, dirs: PhotoDirs) -> Self {
        Self {
            store,
            camera,
            encoder,
            matcher: EuclideanMatcher { tolerance },
            dirs,
        }
    }

    /// Capture a face and store it with the card details.
    ///
    /// Nothing is written when no face is found.
    pub fn register(&mut self, name: &str, card: &CardDetails) -> Result<RegisterOutcome, GateError> {
        let Some((embedding, frame)) = self.capture_face()? else {
            return Ok(RegisterOutcome::NoFace);
        };
        save_photo(&frame, &self.dirs.registration.join(REGISTRATION_PHOTO));

        let record = CardRecord::new(name, &card.card_number, &embedding, &card.cvv, &card.expiry_date);
        self.store.append(&record)?;

        tracing::info!(name, dims = embedding.len(), "registered face");
        Ok(RegisterOutcome::Registered { record })
    }

    /// Check the card details, then the face of whoever is at the camera.
    pub fn access(&mut self, card: &CardDetails) -> Result<AccessOutcome, GateError> {
        let records = self.store.load_all()?;
        if records.is_empty() {
            return Ok(AccessOutcome::NoUsers);
        }

        let Some(record) =
            cardgate_store::find_by_credentials(&records, &card.card_number, &card.cvv, &card.expiry_date)
        else {
            tracing::info!("card details not found");
            return Ok(AccessOutcome::NotFound);
        };

        let probe = self.capture_face()?;
        if let Some((_, frame)) = &probe {
            save_photo(frame, &self.dirs.access.join(ACCESS_PHOTO));
        }

        let registered = record.embedding().unwrap_or_else(|e| {
            tracing::warn!(error = %e, name = %record.name, "stored face encoding unreadable");
            Embedding::new(Vec::new())
        });

        let result = probe
            .as_ref()
            .map(|(embedding, _)| self.matcher.compare(&registered, embedding));

        match result {
            Some(m) if m.matched => {
                tracing::info!(name = %record.name, distance = ?m.distance, "access granted");
                Ok(AccessOutcome::Granted {
                    record: record.clone(),
                    distance: m.distance.unwrap_or_default(),
                })
            }
            other => {
                let face_detected = other.is_some();
                let distance = other.and_then(|m| m.distance);
                tracing::warn!(name = %record.name, face_detected, ?distance, "face mismatch");
                let evidence = self.record_evidence();
                Ok(AccessOutcome::Denied {
                    face_detected,
                    distance,
                    evidence,
                })
            }
        }
    }

    /// Grab a frame and encode the face in it, if there is one.
    fn capture_face(&mut self) -> Result<Option<(Embedding, Frame)>, GateError> {
        let frame = self.camera.grab()?;
        let embedding = self.encoder.encode(&frame.data, frame.width, frame.height)?;
        Ok(embedding.map(|e| (e, frame)))
    }

    /// Photograph whoever failed the check. Failure here never changes the
    /// access outcome.
    fn record_evidence(&mut self) -> Option<PathBuf> {
        let path = evidence_path(&self.dirs.fraud, chrono::Local::now());
        let frame = match self.camera.grab() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "could not capture unauthorized user");
                return None;
            }
        };
        match frame.save(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "saved fraud snapshot");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not save fraud snapshot");
                None
            }
        }
    }
}

/// `<fraud_dir>/unauthorized_YYYYMMDDHHMMSS.png`
pub fn evidence_path<Tz: chrono::TimeZone>(fraud_dir: &Path, at: chrono::DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    fraud_dir.join(format!("unauthorized_{}.png", at.format("%Y%m%d%H%M%S")))
}

fn save_photo(frame: &Frame, path: &Path) {
    if let Err(e) = frame.save(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not save photo");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Hands out uniform grey frames and counts how many were taken. Once
    /// `fail_after` frames have been handed out, every grab fails.
    struct FakeCamera {
        grabs: usize,
        fail_after: Option<usize>,
    }

    impl FrameSource for FakeCamera {
        fn grab(&mut self) -> Result<Frame, CameraError> {
            if self.fail_after.is_some_and(|n| self.grabs >= n) {
                return Err(CameraError::DeviceNotFound("/dev/video0".into()));
            }
            self.grabs += 1;
            Ok(Frame::new(vec![120; 8 * 8], 8, 8, self.grabs as u32))
        }
    }

    /// Returns queued encodings in order.
    struct FakeEncoder(VecDeque<Option<Embedding>>);

    impl FaceEncoder for FakeEncoder {
        fn encode(&mut self, _: &[u8], _: u32, _: u32) -> Result<Option<Embedding>, EncodeError> {
            Ok(self.0.pop_front().flatten())
        }
    }

    fn face(values: &[f32]) -> Option<Embedding> {
        Some(Embedding::new(values.to_vec()))
    }

    fn card(number: &str) -> CardDetails {
        CardDetails {
            card_number: number.into(),
            cvv: "123".into(),
            expiry_date: "08/28".into(),
        }
    }

    fn gate(dir: &TempDir, encodings: Vec<Option<Embedding>>) -> Gate<FakeCamera, FakeEncoder> {
        let store = CardStore::new(dir.path().join("user_database.xlsx"));
        store.ensure().unwrap();
        Gate::new(
            store,
            FakeCamera {
                grabs: 0,
                fail_after: None,
            },
            FakeEncoder(encodings.into()),
            0.6,
            PhotoDirs {
                registration: dir.path().join("registration_photos"),
                access: dir.path().join("access_photos"),
                fraud: dir.path().join("fraud"),
            },
        )
    }

    fn fraud_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("fraud"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_register_stores_record_and_photo() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.1, 0.2, 0.3])]);

        let outcome = gate.register("Ada", &card("4111 1111 1111 1111")).unwrap();
        assert!(matches!(outcome, RegisterOutcome::Registered { .. }));

        let records = gate.store.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Ada");
        assert_eq!(records[0].face_encoding, "0.1,0.2,0.3");
        assert!(dir.path().join("registration_photos").join(REGISTRATION_PHOTO).exists());
    }

    #[test]
    fn test_register_without_face_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![None]);

        let outcome = gate.register("Ada", &card("4111")).unwrap();
        assert!(matches!(outcome, RegisterOutcome::NoFace));
        assert!(gate.store.load_all().unwrap().is_empty());
        assert!(!dir.path().join("registration_photos").exists());
    }

    #[test]
    fn test_access_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![]);
        assert!(matches!(gate.access(&card("4111")).unwrap(), AccessOutcome::NoUsers));
        assert_eq!(gate.camera.grabs, 0);
    }

    #[test]
    fn test_access_unknown_card_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.1, 0.2])]);
        gate.register("Ada", &card("4111")).unwrap();

        assert!(matches!(gate.access(&card("5500")).unwrap(), AccessOutcome::NotFound));
        let wrong_cvv = CardDetails {
            cvv: "999".into(),
            ..card("4111")
        };
        assert!(matches!(gate.access(&wrong_cvv).unwrap(), AccessOutcome::NotFound));
        assert_eq!(gate.camera.grabs, 1, "only the registration grab");
    }

    #[test]
    fn test_access_granted_on_same_face() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.1, 0.2]), face(&[0.1, 0.3])]);
        gate.register("Ada", &card("4111")).unwrap();

        match gate.access(&card(" 4111 ")).unwrap() {
            AccessOutcome::Granted { record, distance } => {
                assert_eq!(record.name, "Ada");
                assert_eq!(record.cvv, "123");
                assert!((distance - 0.1).abs() < 1e-6);
            }
            other => panic!("expected grant, got {other:?}"),
        }
        assert_eq!(fraud_files(&dir), 0);
        assert!(dir.path().join("access_photos").join(ACCESS_PHOTO).exists());
    }

    #[test]
    fn test_access_denied_saves_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.0, 0.0]), face(&[1.0, 1.0])]);
        gate.register("Ada", &card("4111")).unwrap();

        match gate.access(&card("4111")).unwrap() {
            AccessOutcome::Denied {
                face_detected,
                distance,
                evidence,
            } => {
                assert!(face_detected);
                assert!((distance.unwrap() - 2f32.sqrt()).abs() < 1e-6);
                assert!(evidence.unwrap().exists());
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert_eq!(fraud_files(&dir), 1);
        // registration, probe, evidence
        assert_eq!(gate.camera.grabs, 3);
    }

    #[test]
    fn test_access_without_face_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.0, 0.0]), None]);
        gate.register("Ada", &card("4111")).unwrap();

        match gate.access(&card("4111")).unwrap() {
            AccessOutcome::Denied {
                face_detected,
                distance,
                evidence,
            } => {
                assert!(!face_detected);
                assert!(distance.is_none());
                assert!(evidence.is_some());
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert!(!dir.path().join("access_photos").exists());
    }

    #[test]
    fn test_access_unreadable_encoding_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.1, 0.2])]);
        gate.store
            .append(&CardRecord {
                name: "Ada".into(),
                card_number: "4111".into(),
                face_encoding: "abc".into(),
                cvv: "123".into(),
                expiry_date: "08/28".into(),
            })
            .unwrap();

        match gate.access(&card("4111")).unwrap() {
            AccessOutcome::Denied {
                face_detected,
                distance,
                evidence,
            } => {
                assert!(face_detected);
                assert!(distance.is_none());
                assert!(evidence.unwrap().exists());
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert_eq!(fraud_files(&dir), 1);
    }

    #[test]
    fn test_evidence_failure_still_denies() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.0, 0.0]), face(&[1.0, 1.0])]);
        gate.register("Ada", &card("4111")).unwrap();
        // registration and probe succeed, the evidence grab fails
        gate.camera.fail_after = Some(2);

        match gate.access(&card("4111")).unwrap() {
            AccessOutcome::Denied {
                distance, evidence, ..
            } => {
                assert!(distance.is_some());
                assert!(evidence.is_none());
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert_eq!(fraud_files(&dir), 0);
    }

    #[test]
    fn test_access_dimension_mismatch_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![face(&[0.0; 128]), face(&[0.0; 512])]);
        gate.register("Ada", &card("4111")).unwrap();

        assert!(matches!(
            gate.access(&card("4111")).unwrap(),
            AccessOutcome::Denied { distance: None, .. }
        ));
    }

    #[test]
    fn test_access_first_duplicate_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(
            &dir,
            vec![face(&[0.0, 0.0]), face(&[5.0, 5.0]), face(&[5.0, 5.0])],
        );
        gate.register("First", &card("4111")).unwrap();
        gate.register("Second", &card("4111")).unwrap();

        // Probe matches the second record's face only; the first row wins the lookup.
        assert!(matches!(
            gate.access(&card("4111")).unwrap(),
            AccessOutcome::Denied { .. }
        ));
    }

    #[test]
    fn test_camera_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate(&dir, vec![]);
        gate.camera.fail_after = Some(0);
        assert!(matches!(
            gate.register("Ada", &card("4111")),
            Err(GateError::Camera(_))
        ));
    }

    #[test]
    fn test_evidence_path_format() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            evidence_path(Path::new("fraud"), at),
            PathBuf::from("fraud/unauthorized_20240309140507.png")
        );
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(AccessOutcome::NotFound).unwrap();
        assert_eq!(json["outcome"], "not_found");
        let json = serde_json::to_value(AccessOutcome::Denied {
            face_detected: true,
            distance: Some(0.9),
            evidence: None,
        })
        .unwrap();
        assert_eq!(json["outcome"], "denied");
        assert_eq!(json["face_detected"], true);
        assert!(json["evidence"].is_null());
    }
}
