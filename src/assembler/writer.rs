//! Object code output.
//!
//! Object code is a flat stream of big-endian words. Writers only ever move forward; gaps between written regions are
//! filled with zeros. A writer that never receives any data never creates output.

use std::fmt::Debug;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors of object code writers.
#[derive(Error, Debug, Clone)]
pub enum WriterError {
	/// The write offset can only move forward.
	#[error("Cannot move the write offset back from {current:#06x} to {requested:#06x}")]
	Rewind {
		/// Byte offset the writer is at.
		current:   u32,
		/// Requested byte offset.
		requested: u32,
	},
	/// The output sink failed.
	#[error("Output failed: {0}")]
	Io(Arc<io::Error>),
}

impl From<io::Error> for WriterError {
	fn from(error: io::Error) -> Self {
		Self::Io(Arc::new(error))
	}
}

/// An append-only, gap-filling object code sink. All offsets are byte offsets.
pub trait ObjectCodeWriter: Debug {
	/// Writes bytes at the current offset and advances past them.
	///
	/// # Errors
	/// If the underlying sink fails.
	fn write(&mut self, bytes: &[u8]) -> Result<(), WriterError>;

	/// Moves the write offset forward, zero-filling the gap.
	///
	/// # Errors
	/// If the offset lies before the current offset, or the underlying sink fails.
	fn advance_to_write_offset(&mut self, offset: u32) -> Result<(), WriterError>;

	/// The offset of the next write.
	fn current_write_offset(&self) -> u32;

	/// Offset of the first byte of real data, if anything was written yet.
	fn first_write_offset(&self) -> Option<u32>;

	/// Discards everything written and resets the writer to its start offset.
	///
	/// # Errors
	/// If the underlying sink fails to delete its output.
	fn delete_output(&mut self) -> Result<(), WriterError>;

	/// Flushes and closes the output. Writing afterwards reopens it.
	///
	/// # Errors
	/// If the underlying sink fails.
	fn close(&mut self) -> Result<(), WriterError>;
}

/// The storage behind an [`ObjectWriter`]. Storage is created lazily on the first append.
pub trait OutputSink: Debug {
	/// Appends bytes, creating the output if necessary.
	///
	/// # Errors
	/// I/O errors.
	fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

	/// Removes the output entirely.
	///
	/// # Errors
	/// I/O errors.
	fn delete(&mut self) -> io::Result<()>;

	/// Flushes pending output.
	///
	/// # Errors
	/// I/O errors.
	fn close(&mut self) -> io::Result<()>;
}

/// The standard [`ObjectCodeWriter`] on top of any [`OutputSink`].
#[derive(Debug)]
pub struct ObjectWriter<S: OutputSink> {
	sink:         S,
	start_offset: u32,
	offset:       u32,
	/// Offset that was reached by writing bytes to the sink. Everything between this and `offset` is a pending gap.
	written_to:   u32,
	first_write:  Option<u32>,
}

impl<S: OutputSink> ObjectWriter<S> {
	/// Creates a writer whose output starts at the given byte offset.
	pub const fn new(sink: S, start_offset: u32) -> Self {
		Self { sink, start_offset, offset: start_offset, written_to: start_offset, first_write: None }
	}

	/// The underlying sink.
	pub const fn sink(&self) -> &S {
		&self.sink
	}

	fn fill_gap(&mut self) -> io::Result<()> {
		const CHUNK: [u8; 256] = [0; 256];
		while self.written_to < self.offset {
			let length = (self.offset - self.written_to).min(CHUNK.len() as u32);
			self.sink.append(&CHUNK[.. length as usize])?;
			self.written_to += length;
		}
		Ok(())
	}
}

impl<S: OutputSink> ObjectCodeWriter for ObjectWriter<S> {
	fn write(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
		if bytes.is_empty() {
			return Ok(());
		}
		self.fill_gap()?;
		self.sink.append(bytes)?;
		self.first_write.get_or_insert(self.offset);
		self.offset += bytes.len() as u32;
		self.written_to = self.offset;
		Ok(())
	}

	fn advance_to_write_offset(&mut self, offset: u32) -> Result<(), WriterError> {
		if offset < self.offset {
			return Err(WriterError::Rewind { current: self.offset, requested: offset });
		}
		self.offset = offset;
		// Before the first write, the gap stays pending.
		if self.first_write.is_some() {
			self.fill_gap()?;
		}
		Ok(())
	}

	fn current_write_offset(&self) -> u32 {
		self.offset
	}

	fn first_write_offset(&self) -> Option<u32> {
		self.first_write
	}

	fn delete_output(&mut self) -> Result<(), WriterError> {
		debug!("deleting output of {:?}", self.sink);
		self.sink.delete()?;
		self.offset = self.start_offset;
		self.written_to = self.start_offset;
		self.first_write = None;
		Ok(())
	}

	fn close(&mut self) -> Result<(), WriterError> {
		Ok(self.sink.close()?)
	}
}

/// Writes to a file, which is only created once there is data.
#[derive(Debug)]
pub struct FileSink {
	path: PathBuf,
	file: Option<BufWriter<File>>,
}

impl FileSink {
	/// Creates a sink for the given path.
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), file: None }
	}

	/// The output path.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl OutputSink for FileSink {
	fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
		let file = match &mut self.file {
			Some(file) => file,
			None => self.file.insert(BufWriter::new(File::create(&self.path)?)),
		};
		file.write_all(bytes)
	}

	fn delete(&mut self) -> io::Result<()> {
		self.file = None;
		match std::fs::remove_file(&self.path) {
			Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
			_ => Ok(()),
		}
	}

	fn close(&mut self) -> io::Result<()> {
		self.file.take().map_or(Ok(()), |mut file| file.flush())
	}
}

/// An in-memory sink. Clones share the same buffer, so the output can be read after the writer is gone.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
	buffer: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemorySink {
	/// Creates an empty sink.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// The output, or `None` if there is none.
	#[must_use]
	pub fn contents(&self) -> Option<Vec<u8>> {
		self.buffer.lock().clone()
	}
}

impl OutputSink for MemorySink {
	fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
		self.buffer.lock().get_or_insert_with(Vec::new).extend_from_slice(bytes);
		Ok(())
	}

	fn delete(&mut self) -> io::Result<()> {
		*self.buffer.lock() = None;
		Ok(())
	}

	fn close(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// Creates one writer per compilation unit.
pub trait WriterFactory: Debug {
	/// Creates the writer for a unit.
	///
	/// # Errors
	/// If the output can't be prepared.
	fn create_writer(
		&mut self,
		unit: usize,
		name: &Path,
		start_offset: u32,
	) -> Result<Box<dyn ObjectCodeWriter>, WriterError>;
}

/// Keeps all output in memory.
#[derive(Debug, Default)]
pub struct MemoryWriterFactory {
	sinks: Vec<(usize, MemorySink)>,
}

impl MemoryWriterFactory {
	/// Creates a factory without any outputs.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// The output of a unit, if the unit produced any.
	#[must_use]
	pub fn output(&self, unit: usize) -> Option<Vec<u8>> {
		self.sinks.iter().find(|(index, _)| *index == unit).and_then(|(_, sink)| sink.contents())
	}
}

impl WriterFactory for MemoryWriterFactory {
	fn create_writer(
		&mut self,
		unit: usize,
		_name: &Path,
		start_offset: u32,
	) -> Result<Box<dyn ObjectCodeWriter>, WriterError> {
		let sink = MemorySink::new();
		self.sinks.retain(|(index, _)| *index != unit);
		self.sinks.push((unit, sink.clone()));
		Ok(Box::new(ObjectWriter::new(sink, start_offset)))
	}
}

/// Writes each unit to a file.
///
/// With a single unit, the output goes to the given path. With several units, the name of each unit's source file is
/// appended to the output file stem, so `out.bin` becomes `out-main.bin` for `main.dasm`.
#[derive(Debug)]
pub struct FileWriterFactory {
	output:     PathBuf,
	unit_count: usize,
}

impl FileWriterFactory {
	/// Creates a factory for the given number of units.
	#[must_use]
	pub const fn new(output: PathBuf, unit_count: usize) -> Self {
		Self { output, unit_count }
	}

	/// Output path for a unit.
	#[must_use]
	pub fn output_path(&self, name: &Path) -> PathBuf {
		if self.unit_count <= 1 {
			return self.output.clone();
		}
		let unit_stem = name.file_stem().unwrap_or_default().to_string_lossy();
		let stem = self.output.file_stem().unwrap_or_default().to_string_lossy();
		let file_name = match self.output.extension() {
			Some(extension) => format!("{stem}-{unit_stem}.{}", extension.to_string_lossy()),
			None => format!("{stem}-{unit_stem}"),
		};
		self.output.with_file_name(file_name)
	}
}

impl WriterFactory for FileWriterFactory {
	fn create_writer(
		&mut self,
		_unit: usize,
		name: &Path,
		start_offset: u32,
	) -> Result<Box<dyn ObjectCodeWriter>, WriterError> {
		Ok(Box::new(ObjectWriter::new(FileSink::new(self.output_path(name)), start_offset)))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn writer() -> (ObjectWriter<MemorySink>, MemorySink) {
		let sink = MemorySink::new();
		(ObjectWriter::new(sink.clone(), 0), sink)
	}

	#[test]
	fn rewind_is_rejected() {
		let (mut writer, _) = writer();
		writer.advance_to_write_offset(10).unwrap();
		assert!(matches!(writer.advance_to_write_offset(4), Err(WriterError::Rewind { current: 10, requested: 4 })));
		assert_eq!(writer.current_write_offset(), 10);
	}

	#[test]
	fn advancing_to_the_same_offset_does_nothing() {
		let (mut writer, sink) = writer();
		writer.write(&[1, 2]).unwrap();
		writer.advance_to_write_offset(2).unwrap();
		writer.advance_to_write_offset(2).unwrap();
		assert_eq!(writer.current_write_offset(), 2);
		assert_eq!(sink.contents(), Some(vec![1, 2]));
	}

	#[test]
	fn gap_before_first_write_is_lazy() {
		let (mut writer, sink) = writer();
		writer.advance_to_write_offset(4).unwrap();
		assert_eq!(sink.contents(), None);
		assert_eq!(writer.first_write_offset(), None);

		writer.write(&[0xab, 0xcd]).unwrap();
		assert_eq!(sink.contents(), Some(vec![0, 0, 0, 0, 0xab, 0xcd]));
		assert_eq!(writer.first_write_offset(), Some(4));
		assert_eq!(writer.current_write_offset(), 6);
	}

	#[test]
	fn gaps_after_data_are_filled() {
		let (mut writer, sink) = writer();
		writer.write(&[1]).unwrap();
		writer.advance_to_write_offset(600).unwrap();
		let contents = sink.contents().unwrap();
		assert_eq!(contents.len(), 600);
		assert!(contents[1 ..].iter().all(|byte| *byte == 0));
	}

	#[test]
	fn delete_resets_writer() {
		let sink = MemorySink::new();
		let mut writer = ObjectWriter::new(sink.clone(), 8);
		writer.write(&[1, 2]).unwrap();
		writer.delete_output().unwrap();
		assert_eq!(sink.contents(), None);
		assert_eq!(writer.current_write_offset(), 8);
		assert_eq!(writer.first_write_offset(), None);
		writer.write(&[3]).unwrap();
		assert_eq!(sink.contents(), Some(vec![3]));
	}

	#[test]
	fn file_names_for_several_units() {
		let factory = FileWriterFactory::new(PathBuf::from("build/out.bin"), 2);
		assert_eq!(factory.output_path(Path::new("src/main.dasm")), PathBuf::from("build/out-main.bin"));
		let factory = FileWriterFactory::new(PathBuf::from("out.bin"), 1);
		assert_eq!(factory.output_path(Path::new("main.dasm")), PathBuf::from("out.bin"));
	}
}
