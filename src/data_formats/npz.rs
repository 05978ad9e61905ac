// src/data_formats/npz.rs
//
// NumPy `.npz` archives as the on-disk form of both dataset families.
//
// Sentiment files hold `<split>/<modality>.npy` entries; meld files hold
// `<id>/<field>.npy` entries, one group per utterance.

use ndarray::{arr0, Array, ArrayBase, ArrayD, Data, Dimension, Ix1, Ix2, Ix3};
use ndarray_npy::{ReadNpyError, ReadNpyExt, ReadableElement, WritableElement, WriteNpyExt};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::constants::{
    AUDIO, AUDIO_FEATURES, LABEL, LABELS, NPY_EXT, SPLITS, TEXT, TOKEN_IDS, VIDEO_FEATURES, VISION,
};
use crate::data_loader::DatasetError;
use crate::meld::MeldRecord;
use crate::sentiment::{RawSplit, SentimentSplits};

fn entry_name(key: &str) -> String {
    format!("{key}{NPY_EXT}")
}

/// Read one entry; `Ok(None)` when it holds a different element type.
fn read_entry<A, D, R>(archive: &mut ZipArchive<R>, key: &str) -> Result<Option<Array<A, D>>, DatasetError>
where
    A: ReadableElement,
    D: Dimension,
    R: Read + Seek,
{
    let name = entry_name(key);
    let file = archive.by_name(&name).map_err(|e| match e {
        ZipError::FileNotFound => DatasetError::Format(format!("missing entry {name}")),
        other => DatasetError::from(other),
    })?;
    match Array::<A, D>::read_npy(file) {
        Ok(a) => Ok(Some(a)),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(ReadNpyError::WrongNdim(expected, found)) => {
            let expected = expected.map_or_else(|| "any".to_string(), |n| n.to_string());
            Err(DatasetError::ShapeMismatch(format!(
                "{name}: expected rank {expected}, found rank {found}"
            )))
        }
        Err(e) => Err(DatasetError::Format(format!("{name}: {e}"))),
    }
}

fn read_array<A, D, R>(archive: &mut ZipArchive<R>, key: &str) -> Result<Array<A, D>, DatasetError>
where
    A: ReadableElement,
    D: Dimension,
    R: Read + Seek,
{
    read_entry(archive, key)?.ok_or_else(|| {
        DatasetError::Format(format!(
            "{}: unexpected element type, wanted {}",
            entry_name(key),
            std::any::type_name::<A>()
        ))
    })
}

/// Read a float array stored as either `f32` or `f64`.
fn read_f32<D, R>(archive: &mut ZipArchive<R>, key: &str) -> Result<Array<f32, D>, DatasetError>
where
    D: Dimension,
    R: Read + Seek,
{
    match read_entry::<f32, D, R>(archive, key)? {
        Some(a) => Ok(a),
        None => Ok(read_array::<f64, D, R>(archive, key)?.mapv(|v| v as f32)),
    }
}

/// Read an integer array stored as either `i64` or `i32`.
fn read_i64<D, R>(archive: &mut ZipArchive<R>, key: &str) -> Result<Array<i64, D>, DatasetError>
where
    D: Dimension,
    R: Read + Seek,
{
    match read_entry::<i64, D, R>(archive, key)? {
        Some(a) => Ok(a),
        None => Ok(read_array::<i32, D, R>(archive, key)?.mapv(i64::from)),
    }
}

fn write_array<A, S, D, W>(zip: &mut ZipWriter<W>, key: &str, array: &ArrayBase<S, D>) -> Result<(), DatasetError>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
    W: Write + Seek,
{
    let name = entry_name(key);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file(name.clone(), opts)?;
    array
        .write_npy(&mut *zip)
        .map_err(|e| DatasetError::Format(format!("{name}: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Sentiment family
// ────────────────────────────────────────────────────────────────────────────

/// Read the train/valid/test splits from an archive.
pub fn read_sentiment<R: Read + Seek>(reader: R) -> Result<SentimentSplits, DatasetError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut read_split = |split: &str| -> Result<RawSplit, DatasetError> {
        let key = |m: &str| format!("{split}/{m}");
        RawSplit::new(
            read_f32::<Ix3, _>(&mut archive, &key(TEXT))?,
            read_f32::<Ix3, _>(&mut archive, &key(AUDIO))?,
            read_f32::<Ix3, _>(&mut archive, &key(VISION))?,
            read_f32(&mut archive, &key(LABELS))?,
        )
    };
    let [train, valid, test] = SPLITS;
    Ok(SentimentSplits {
        train: read_split(train)?,
        valid: read_split(valid)?,
        test: read_split(test)?,
    })
}

pub fn read_sentiment_npz(path: impl AsRef<Path>) -> Result<SentimentSplits, DatasetError> {
    let path = path.as_ref();
    let splits = read_sentiment(BufReader::new(File::open(path)?))?;
    info!(
        path = %path.display(),
        train = splits.train.len(),
        valid = splits.valid.len(),
        test = splits.test.len(),
        "loaded sentiment splits"
    );
    Ok(splits)
}

pub fn write_sentiment<W: Write + Seek>(writer: W, splits: &SentimentSplits) -> Result<W, DatasetError> {
    let mut zip = ZipWriter::new(writer);
    for (name, split) in splits.iter() {
        write_array(&mut zip, &format!("{name}/{TEXT}"), &split.text)?;
        write_array(&mut zip, &format!("{name}/{AUDIO}"), &split.audio)?;
        write_array(&mut zip, &format!("{name}/{VISION}"), &split.vision)?;
        write_array(&mut zip, &format!("{name}/{LABELS}"), &split.labels)?;
    }
    Ok(zip.finish()?)
}

pub fn write_sentiment_npz(path: impl AsRef<Path>, splits: &SentimentSplits) -> Result<(), DatasetError> {
    let mut out = write_sentiment(BufWriter::new(File::create(path)?), splits)?;
    out.flush()?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Meld family
// ────────────────────────────────────────────────────────────────────────────

/// Read every record, ordered by id.
pub fn read_meld<R: Read + Seek>(reader: R) -> Result<Vec<MeldRecord>, DatasetError> {
    let mut archive = ZipArchive::new(reader)?;
    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();

    let mut ids = BTreeSet::new();
    for name in &names {
        match name.strip_suffix(NPY_EXT).and_then(|k| k.rsplit_once('/')) {
            Some((id, _)) => {
                ids.insert(id.to_string());
            }
            None => debug!(entry = %name, "ignoring entry outside the record layout"),
        }
    }

    ids.into_iter()
        .map(|id| {
            let key = |field: &str| format!("{id}/{field}");
            let label: ArrayD<i64> = read_i64(&mut archive, &key(LABEL))?;
            let label = match label.as_slice() {
                Some(&[v]) => v,
                _ => {
                    return Err(DatasetError::ShapeMismatch(format!(
                        "record {id}: label has shape {:?}",
                        label.shape()
                    )))
                }
            };
            Ok(MeldRecord {
                token_ids: read_i64::<Ix1, _>(&mut archive, &key(TOKEN_IDS))?,
                video_features: read_f32::<Ix2, _>(&mut archive, &key(VIDEO_FEATURES))?,
                audio_features: read_f32::<Ix2, _>(&mut archive, &key(AUDIO_FEATURES))?,
                label,
                id,
            })
        })
        .collect()
}

pub fn read_meld_npz(path: impl AsRef<Path>) -> Result<Vec<MeldRecord>, DatasetError> {
    let path = path.as_ref();
    let records = read_meld(BufReader::new(File::open(path)?))?;
    info!(path = %path.display(), records = records.len(), "loaded meld records");
    Ok(records)
}

pub fn write_meld<W: Write + Seek>(writer: W, records: &[MeldRecord]) -> Result<W, DatasetError> {
    let mut zip = ZipWriter::new(writer);
    for r in records {
        if r.id.is_empty() || r.id.contains('/') {
            return Err(DatasetError::Format(format!("record id {:?} cannot be stored", r.id)));
        }
        write_array(&mut zip, &format!("{}/{TOKEN_IDS}", r.id), &r.token_ids)?;
        write_array(&mut zip, &format!("{}/{VIDEO_FEATURES}", r.id), &r.video_features)?;
        write_array(&mut zip, &format!("{}/{AUDIO_FEATURES}", r.id), &r.audio_features)?;
        write_array(&mut zip, &format!("{}/{LABEL}", r.id), &arr0(r.label))?;
    }
    Ok(zip.finish()?)
}

pub fn write_meld_npz(path: impl AsRef<Path>, records: &[MeldRecord]) -> Result<(), DatasetError> {
    let mut out = write_meld(BufWriter::new(File::create(path)?), records)?;
    out.flush()?;
    Ok(())
}
