//! Progress store and per-format writer (spec §4.6).
//!
//! One [`FormatWriter`] per downloaded format. It owns the `{final}.sabr.binpb` progress
//! document and the `{final}.seq{N}.sabr.part` / `{final}.seqinit.sabr.part` part files
//! exclusively; the session engine never touches disk itself, only emits [`Event::MediaSegment`]
//! for the writer to persist.
//!
//! Requires the `fetch` feature: the atomic rewrite relies on [`tempfile`], which is only
//! pulled in for that feature's filesystem-writing callers.
#![cfg(feature = "fetch")]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::{Result, SabrError};
use crate::proto::{BufferedRange, FormatId, ProgressDocument, ProgressInitSegment, ProgressSegmentEntry, ProgressSequence};

/// Persists the segments of one format to disk, and assembles the final output on completion.
pub struct FormatWriter {
    final_path: PathBuf,
    format_id: Option<FormatId>,
    doc: ProgressDocument,
}

impl FormatWriter {
    /// Creates a writer with no prior progress. `final_path` is the eventual output file; the
    /// progress document and part files are named from it (spec §6 "Persistent files").
    pub fn new(final_path: impl Into<PathBuf>) -> Self {
        FormatWriter { final_path: final_path.into(), format_id: None, doc: ProgressDocument::default() }
    }

    /// Loads a writer from a previously-persisted progress document, if one exists at
    /// `{final_path}.sabr.binpb`. Returns `Ok(None)` when there is nothing to resume from.
    pub fn resume(final_path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let final_path = final_path.into();
        let progress_path = progress_path_for(&final_path);
        if !progress_path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&progress_path)
            .map_err(|e| SabrError::Io(e, format!("reading progress document {}", progress_path.display())))?;
        let doc = ProgressDocument::decode(&bytes)?;
        let format_id = doc.format_id.clone();
        Ok(Some(FormatWriter { final_path, format_id, doc }))
    }

    /// The buffered ranges recorded in the resumed progress document, to seed
    /// [`crate::sabr::session::SessionState::seed_from_progress`] before the first poll.
    pub fn initial_buffered_ranges(&self) -> Vec<BufferedRange> {
        self.doc.buffered_ranges.clone()
    }

    pub fn has_init_segment(&self) -> bool {
        self.doc.init_segment.is_some()
    }

    /// Total bytes persisted so far: every recorded segment's `content_length` plus the init
    /// segment's, if present.
    pub fn downloaded_bytes(&self) -> u64 {
        let init = self.doc.init_segment.as_ref().map(|i| i.content_length).unwrap_or(0);
        let media: i64 = self.doc.sequences.iter().flat_map(|s| &s.segments).map(|s| s.content_length).sum();
        (init + media).max(0) as u64
    }

    fn progress_path(&self) -> PathBuf {
        progress_path_for(&self.final_path)
    }

    fn init_part_path(&self) -> PathBuf {
        part_path_for(&self.final_path, "seqinit")
    }

    fn sequence_part_path(&self, sequence_start_number: i64) -> PathBuf {
        part_path_for(&self.final_path, &format!("seq{sequence_start_number}"))
    }

    /// Persists one emitted media segment (spec §4.6, steps 1-6). The caller is expected to
    /// filter [`crate::sabr::session::Event::MediaSegment`] by `selector_index`/`format_id`
    /// before routing it to the writer for the matching format.
    pub fn write_segment(
        &mut self,
        format_id: &FormatId,
        is_init_segment: bool,
        sequence_number: i64,
        content_length: i64,
        data: &[u8],
    ) -> Result<()> {
        match &self.format_id {
            None => self.format_id = Some(format_id.clone()),
            Some(existing) if existing != format_id => {
                return Err(SabrError::Stream(format!(
                    "writer for format {existing} received a segment for format {format_id}"
                )));
            }
            Some(_) => {}
        }
        self.doc.format_id = self.format_id.clone();

        if is_init_segment {
            if self.doc.init_segment.is_some() {
                return Err(SabrError::Protocol("duplicate init segment delivered to writer".to_string()));
            }
            let path = self.init_part_path();
            append_to_file(&path, data)?;
            self.doc.init_segment = Some(ProgressInitSegment {
                filename: file_name_string(&path),
                content_length,
            });
        } else {
            let group_idx = self
                .doc
                .sequences
                .iter()
                .position(|g| g.segments.last().map(|s| s.sequence_number + 1) == Some(sequence_number));
            let group_idx = match group_idx {
                Some(idx) => idx,
                None => {
                    let path = self.sequence_part_path(sequence_number);
                    self.doc.sequences.push(ProgressSequence {
                        sequence_start_number: sequence_number,
                        sequence_filename: file_name_string(&path),
                        segments: Vec::new(),
                    });
                    self.doc.sequences.len() - 1
                }
            };
            let path = self.sequence_part_path(self.doc.sequences[group_idx].sequence_start_number);
            append_to_file(&path, data)?;
            self.doc.sequences[group_idx].segments.push(ProgressSegmentEntry { sequence_number, content_length });
        }

        self.rewrite_progress_document()
    }

    /// Overwrites the progress document's recorded buffered ranges and rewrites it to disk.
    /// Called by the driving loop after each batch of events, from
    /// [`crate::sabr::session::SabrSession::buffered_ranges`], so a resumed session can recover
    /// exactly the ranges the server last acknowledged (spec §4.6 step 5).
    pub fn update_buffered_ranges(&mut self, buffered_ranges: Vec<BufferedRange>) -> Result<()> {
        self.doc.buffered_ranges = buffered_ranges;
        self.rewrite_progress_document()
    }

    fn rewrite_progress_document(&self) -> Result<()> {
        let progress_path = self.progress_path();
        let dir = progress_path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| SabrError::Io(e, "creating temporary progress document".to_string()))?;
        tmp.write_all(&self.doc.encode())
            .map_err(|e| SabrError::Io(e, "writing temporary progress document".to_string()))?;
        tmp.persist(&progress_path)
            .map_err(|e| SabrError::Io(e.error, format!("renaming progress document into place at {}", progress_path.display())))?;
        trace!(path = %progress_path.display(), "rewrote progress document");
        Ok(())
    }

    /// Sets the session's initial buffered ranges for this format (called by the driving loop
    /// once the matching [`crate::sabr::format::InitializedFormat`] exists).
    pub fn seed(&self, state: &mut crate::sabr::session::SessionState, format_id: &FormatId) {
        state.seed_from_progress(format_id, self.initial_buffered_ranges(), self.has_init_segment());
    }

    /// Concatenates the init segment (if any) and every sequence group in ascending
    /// `sequence_start_number` order into the final output, then removes the progress document
    /// and part files (spec §4.6 "On finish").
    pub fn finish(mut self) -> Result<()> {
        let dir = self.final_path.parent().unwrap_or_else(|| Path::new("."));
        let mut out = NamedTempFile::new_in(dir)
            .map_err(|e| SabrError::Io(e, "creating temporary output file".to_string()))?;

        if let Some(init) = &self.doc.init_segment {
            let bytes = fs::read(sibling_path(&self.final_path, &init.filename))
                .map_err(|e| SabrError::Io(e, format!("reading init part {}", init.filename)))?;
            out.write_all(&bytes).map_err(|e| SabrError::Io(e, "writing init bytes to output".to_string()))?;
        }

        let mut sequences = self.doc.sequences.clone();
        sequences.sort_by_key(|s| s.sequence_start_number);
        for seq in &sequences {
            let bytes = fs::read(sibling_path(&self.final_path, &seq.sequence_filename))
                .map_err(|e| SabrError::Io(e, format!("reading sequence part {}", seq.sequence_filename)))?;
            out.write_all(&bytes).map_err(|e| SabrError::Io(e, "writing sequence bytes to output".to_string()))?;
        }

        out.persist(&self.final_path)
            .map_err(|e| SabrError::Io(e.error, format!("renaming output into place at {}", self.final_path.display())))?;

        if let Some(init) = self.doc.init_segment.take() {
            let _ = fs::remove_file(sibling_path(&self.final_path, &init.filename));
        }
        for seq in sequences {
            let _ = fs::remove_file(sibling_path(&self.final_path, &seq.sequence_filename));
        }
        let _ = fs::remove_file(self.progress_path());

        debug!(path = %self.final_path.display(), "finished assembling format output");
        Ok(())
    }
}

fn progress_path_for(final_path: &Path) -> PathBuf {
    append_suffix(final_path, "sabr.binpb")
}

fn part_path_for(final_path: &Path, tag: &str) -> PathBuf {
    append_suffix(final_path, &format!("{tag}.sabr.part"))
}

fn append_suffix(final_path: &Path, suffix: &str) -> PathBuf {
    let mut os = final_path.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

fn file_name_string(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn sibling_path(final_path: &Path, file_name: &str) -> PathBuf {
    final_path.parent().map(|p| p.join(file_name)).unwrap_or_else(|| PathBuf::from(file_name))
}

fn append_to_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SabrError::Io(e, format!("opening part file {}", path.display())))?;
    f.write_all(data).map_err(|e| SabrError::Io(e, format!("writing part file {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid() -> FormatId {
        FormatId { itag: Some(140), lmt: Some(1), xtags: None }
    }

    #[test]
    fn write_then_finish_concatenates_init_and_sequences_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("track.m4a");
        let mut w = FormatWriter::new(&out);

        w.write_segment(&fid(), true, 0, 4, b"INIT").unwrap();
        w.write_segment(&fid(), false, 0, 3, b"AAA").unwrap();
        w.write_segment(&fid(), false, 1, 3, b"BBB").unwrap();

        assert_eq!(w.downloaded_bytes(), 10);
        w.finish().unwrap();

        let contents = fs::read(&out).unwrap();
        assert_eq!(contents, b"INITAAABBB");
        assert!(!progress_path_for(&out).exists());
    }

    #[test]
    fn resume_reads_back_a_persisted_progress_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("track.m4a");
        {
            let mut w = FormatWriter::new(&out);
            w.write_segment(&fid(), false, 0, 3, b"AAA").unwrap();
            w.write_segment(&fid(), false, 1, 3, b"BBB").unwrap();
        }
        let resumed = FormatWriter::resume(&out).unwrap().expect("progress document should exist");
        assert_eq!(resumed.downloaded_bytes(), 6);
        assert!(!resumed.has_init_segment());
    }

    #[test]
    fn mismatched_format_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("track.m4a");
        let mut w = FormatWriter::new(&out);
        w.write_segment(&fid(), false, 0, 3, b"AAA").unwrap();
        let other = FormatId { itag: Some(137), lmt: Some(1), xtags: None };
        assert!(w.write_segment(&other, false, 1, 3, b"BBB").is_err());
    }

    #[test]
    fn sequence_groups_extend_contiguously_and_split_on_gap() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("track.m4a");
        let mut w = FormatWriter::new(&out);
        w.write_segment(&fid(), false, 0, 3, b"AAA").unwrap();
        w.write_segment(&fid(), false, 1, 3, b"BBB").unwrap();
        // A non-contiguous sequence number (e.g. after a seek) starts a new group.
        w.write_segment(&fid(), false, 30, 3, b"CCC").unwrap();
        assert_eq!(w.doc.sequences.len(), 2);
        assert_eq!(w.doc.sequences[0].sequence_start_number, 0);
        assert_eq!(w.doc.sequences[1].sequence_start_number, 30);
    }
}
