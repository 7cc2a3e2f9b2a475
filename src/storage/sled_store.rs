//! Sled-backed durable store
//!
//! ## Layout
//! One tree per table. Composite keys are NUL-separated identifiers followed by
//! fixed-width big-endian integers, so prefix scans return rows in timestamp
//! order:
//!
//! | tree              | key                               | value                |
//! |-------------------|-----------------------------------|----------------------|
//! | `parts`           | part                              | empty                |
//! | `signals`         | part ␀ ts                         | f64 (BE)             |
//! | `features`        | part ␀ kind ␀ ts                  | f64 (BE)             |
//! | `forecast_heads`  | part ␀ kind ␀                     | live generation (BE) |
//! | `forecast_meta`   | part ␀ kind ␀ generation          | JSON batch header    |
//! | `forecast_points` | part ␀ kind ␀ generation ts       | JSON forecast point  |
//! | `profiles`        | part                              | JSON profile         |
//! | `conditions`      | part                              | JSON condition state |
//!
//! ## Forecast replacement
//! A new batch is written under a fresh generation id, the head pointer is
//! flipped with a compare-and-swap, and only then are older generations
//! removed. The head only moves forward: a writer that finds a newer
//! generation already live drops its own instead of flipping back. A crash at
//! any step leaves either the old or the new batch live; orphaned generations
//! are collected by the next replacement.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PartStore, StorageError};
use crate::forecast::ArimaOrder;
use crate::types::{
    ConditionState, ForecastBatch, ForecastPoint, PercentCondition, Sample, ThresholdProfile,
    Verdict,
};

/// Re-reads of a forecast batch that raced a concurrent replacement.
const READ_ATTEMPTS: usize = 3;

/// Batch fields stored once per generation.
#[derive(Serialize, Deserialize)]
struct BatchHeader {
    order: ArimaOrder,
    aic: f64,
    confidence_level: f64,
    generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    parts: sled::Tree,
    signals: sled::Tree,
    features: sled::Tree,
    forecast_heads: sled::Tree,
    forecast_meta: sled::Tree,
    forecast_points: sled::Tree,
    profiles: sled::Tree,
    conditions: sled::Tree,
}

// ============================================================================
// Key encoding
// ============================================================================

fn prefix(ids: &[&str]) -> Result<Vec<u8>, StorageError> {
    let mut key = Vec::with_capacity(ids.iter().map(|s| s.len() + 1).sum());
    for id in ids {
        if id.as_bytes().contains(&0) {
            return Err(StorageError::InvalidKey((*id).to_string()));
        }
        key.extend_from_slice(id.as_bytes());
        key.push(0);
    }
    Ok(key)
}

/// Order-preserving encoding of a millisecond timestamp.
fn encode_ts(ts: DateTime<Utc>) -> [u8; 8] {
    ((ts.timestamp_millis() ^ i64::MIN) as u64).to_be_bytes()
}

fn decode_ts(bytes: &[u8], tree: &'static str) -> Result<DateTime<Utc>, StorageError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Corrupt(tree))?;
    let millis = (u64::from_be_bytes(raw) as i64) ^ i64::MIN;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(StorageError::Corrupt(tree))
}

fn decode_f64(bytes: &[u8], tree: &'static str) -> Result<f64, StorageError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Corrupt(tree))?;
    Ok(f64::from_be_bytes(raw))
}

fn decode_u64(bytes: &[u8], tree: &'static str) -> Result<u64, StorageError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Corrupt(tree))?;
    Ok(u64::from_be_bytes(raw))
}

fn with_suffix(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(suffix);
    key
}

impl SledStore {
    /// Open (or create) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "📦 Part store opened");
        Self::from_db(db)
    }

    /// Open a throwaway store that is deleted on drop.
    pub fn open_temp() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            parts: db.open_tree("parts")?,
            signals: db.open_tree("signals")?,
            features: db.open_tree("features")?,
            forecast_heads: db.open_tree("forecast_heads")?,
            forecast_meta: db.open_tree("forecast_meta")?,
            forecast_points: db.open_tree("forecast_points")?,
            profiles: db.open_tree("profiles")?,
            conditions: db.open_tree("conditions")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn size_on_disk(&self) -> Result<u64, StorageError> {
        Ok(self.db.size_on_disk()?)
    }

    fn register_part(&self, part_id: &str) -> Result<(), StorageError> {
        prefix(&[part_id])?;
        self.parts.insert(part_id.as_bytes(), Vec::<u8>::new())?;
        Ok(())
    }

    fn read_series(
        tree: &sled::Tree,
        key_prefix: &[u8],
        name: &'static str,
    ) -> Result<Vec<Sample>, StorageError> {
        tree.scan_prefix(key_prefix)
            .map(|entry| -> Result<Sample, StorageError> {
                let (k, v) = entry?;
                let ts = decode_ts(&k[key_prefix.len()..], name)?;
                Ok(Sample::new(ts, decode_f64(&v, name)?))
            })
            .collect()
    }

    fn write_series(
        tree: &sled::Tree,
        key_prefix: &[u8],
        samples: &[Sample],
    ) -> Result<usize, StorageError> {
        let mut batch = sled::Batch::default();
        for s in samples {
            batch.insert(
                with_suffix(key_prefix, &encode_ts(s.timestamp)),
                s.value.to_be_bytes().to_vec(),
            );
        }
        tree.apply_batch(batch)?;
        Ok(samples.len())
    }

    /// Remove the generations of a forecast key selected by `doomed`.
    fn remove_generations(
        &self,
        key_prefix: &[u8],
        doomed: impl Fn(u64) -> bool,
    ) -> Result<usize, StorageError> {
        let gen_range = key_prefix.len()..key_prefix.len() + 8;
        let mut removed = 0;

        for tree in [&self.forecast_points, &self.forecast_meta] {
            let mut batch = sled::Batch::default();
            for entry in tree.scan_prefix(key_prefix) {
                let (k, _) = entry?;
                let generation = k
                    .get(gen_range.clone())
                    .map(|g| decode_u64(g, "forecast_meta"))
                    .transpose()?;
                if generation.is_some_and(&doomed) {
                    batch.remove(k);
                    removed += 1;
                }
            }
            tree.apply_batch(batch)?;
        }
        Ok(removed)
    }

    /// Write `batch` as `generation` and make it live unless a newer
    /// generation already is. Returns whether the head now points at it.
    fn install_generation(
        &self,
        batch: &ForecastBatch,
        generation: u64,
    ) -> Result<bool, StorageError> {
        let key_prefix = prefix(&[&batch.part_id, &batch.feature_kind])?;
        let gen_prefix = with_suffix(&key_prefix, &generation.to_be_bytes());

        let mut points = sled::Batch::default();
        for p in &batch.points {
            points.insert(
                with_suffix(&gen_prefix, &encode_ts(p.timestamp)),
                serde_json::to_vec(p)?,
            );
        }
        self.forecast_points.apply_batch(points)?;

        let header = BatchHeader {
            order: batch.order,
            aic: batch.aic,
            confidence_level: batch.confidence_level,
            generated_at: batch.generated_at,
        };
        self.forecast_meta
            .insert(&gen_prefix, serde_json::to_vec(&header)?)?;

        // flip: from here on readers see the new generation
        loop {
            let current = self.forecast_heads.get(&key_prefix)?;
            if let Some(head) = &current {
                let live = decode_u64(head, "forecast_heads")?;
                if live > generation {
                    let removed = self.remove_generations(&key_prefix, |g| g == generation)?;
                    debug!(
                        part_id = %batch.part_id,
                        feature_kind = %batch.feature_kind,
                        generation,
                        live,
                        removed,
                        "forecast generation superseded before flip"
                    );
                    return Ok(false);
                }
            }
            if self
                .forecast_heads
                .compare_and_swap(&key_prefix, current, Some(generation.to_be_bytes().to_vec()))?
                .is_ok()
            {
                break;
            }
        }

        let removed = self.remove_generations(&key_prefix, |g| g < generation)?;
        debug!(
            part_id = %batch.part_id,
            feature_kind = %batch.feature_kind,
            generation,
            points = batch.points.len(),
            removed,
            "forecast generation swapped"
        );
        Ok(true)
    }

    fn read_generation(
        &self,
        key_prefix: &[u8],
        part_id: &str,
        feature_kind: &str,
        generation: u64,
    ) -> Result<Option<ForecastBatch>, StorageError> {
        let gen_prefix = with_suffix(key_prefix, &generation.to_be_bytes());
        let Some(raw_header) = self.forecast_meta.get(&gen_prefix)? else {
            return Ok(None);
        };
        let header: BatchHeader = serde_json::from_slice(&raw_header)?;

        let points = self
            .forecast_points
            .scan_prefix(&gen_prefix)
            .map(|entry| -> Result<ForecastPoint, StorageError> {
                let (_, v) = entry?;
                Ok(serde_json::from_slice(&v)?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ForecastBatch {
            part_id: part_id.to_string(),
            feature_kind: feature_kind.to_string(),
            order: header.order,
            aic: header.aic,
            confidence_level: header.confidence_level,
            generated_at: header.generated_at,
            points,
        }))
    }
}

impl PartStore for SledStore {
    fn list_parts(&self) -> Result<Vec<String>, StorageError> {
        self.parts
            .iter()
            .keys()
            .map(|k| -> Result<String, StorageError> {
                let k = k?;
                String::from_utf8(k.to_vec()).map_err(|_| StorageError::Corrupt("parts"))
            })
            .collect()
    }

    fn read_signal(&self, part_id: &str) -> Result<Vec<Sample>, StorageError> {
        Self::read_series(&self.signals, &prefix(&[part_id])?, "signals")
    }

    fn append_signal(&self, part_id: &str, samples: &[Sample]) -> Result<usize, StorageError> {
        self.register_part(part_id)?;
        Self::write_series(&self.signals, &prefix(&[part_id])?, samples)
    }

    fn read_feature_series(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<Vec<Sample>, StorageError> {
        Self::read_series(&self.features, &prefix(&[part_id, feature_kind])?, "features")
    }

    fn write_feature_points(
        &self,
        part_id: &str,
        feature_kind: &str,
        points: &[Sample],
    ) -> Result<usize, StorageError> {
        Self::write_series(&self.features, &prefix(&[part_id, feature_kind])?, points)
    }

    fn delete_feature_points(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<usize, StorageError> {
        let key_prefix = prefix(&[part_id, feature_kind])?;
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for entry in self.features.scan_prefix(&key_prefix) {
            let (k, _) = entry?;
            batch.remove(k);
            removed += 1;
        }
        self.features.apply_batch(batch)?;
        Ok(removed)
    }

    fn read_forecast_batch(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<Option<ForecastBatch>, StorageError> {
        let key_prefix = prefix(&[part_id, feature_kind])?;

        for _ in 0..READ_ATTEMPTS {
            let Some(head) = self.forecast_heads.get(&key_prefix)? else {
                return Ok(None);
            };
            let generation = decode_u64(&head, "forecast_heads")?;
            let batch = self.read_generation(&key_prefix, part_id, feature_kind, generation)?;

            // the generation may have been collected while we were scanning it
            if self.forecast_heads.get(&key_prefix)?.as_deref() == Some(&head[..]) {
                if let Some(batch) = batch {
                    return Ok(Some(batch));
                }
            }
        }
        Err(StorageError::Storage(format!(
            "forecast batch for {part_id}/{feature_kind} kept changing during read"
        )))
    }

    fn replace_forecast_batch(&self, batch: &ForecastBatch) -> Result<(), StorageError> {
        let generation = self.db.generate_id()?;
        self.install_generation(batch, generation)?;
        Ok(())
    }

    fn read_threshold_profile(
        &self,
        part_id: &str,
    ) -> Result<Option<ThresholdProfile>, StorageError> {
        match self.profiles.get(part_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_threshold_profile(&self, profile: &ThresholdProfile) -> Result<(), StorageError> {
        self.register_part(&profile.part_id)?;
        self.profiles
            .insert(profile.part_id.as_bytes(), serde_json::to_vec(profile)?)?;
        Ok(())
    }

    fn read_condition_state(&self, part_id: &str) -> Result<Option<ConditionState>, StorageError> {
        match self.conditions.get(part_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_condition_state(
        &self,
        part_id: &str,
        verdict: &Verdict,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let state = ConditionState {
            part_id: part_id.to_string(),
            verdict: verdict.clone(),
            percent: None,
            updated_at,
        };
        self.conditions
            .insert(part_id.as_bytes(), serde_json::to_vec(&state)?)?;
        Ok(())
    }

    fn write_percent_condition(
        &self,
        part_id: &str,
        percent: PercentCondition,
    ) -> Result<(), StorageError> {
        loop {
            let Some(current) = self.conditions.get(part_id.as_bytes())? else {
                return Err(StorageError::NoConditionRecord(part_id.to_string()));
            };
            let mut state: ConditionState = serde_json::from_slice(&current)?;
            state.percent = Some(percent);
            let updated = serde_json::to_vec(&state)?;
            if self
                .conditions
                .compare_and_swap(part_id.as_bytes(), Some(current), Some(updated))?
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
