//! Source code infrastructure: source text containers and the resolution of included resources.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use flexstr::SharedStr;
use miette::{MietteError, MietteSpanContents, SourceCode, SourceSpan, SpanContents};

/// The source code of one compilation unit or included file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyCode {
	/// The text content of the assembly code.
	pub text:         SharedStr,
	/// File name or (possibly fake) resource name.
	pub name:         PathBuf,
	/// The chain of files that included this one, outermost first.
	pub include_path: Vec<PathBuf>,
}

impl AssemblyCode {
	/// Create a new source code struct from source code text and a (possibly fake) name.
	#[must_use]
	pub fn new(text: &str, name: &str) -> Self {
		Self::new_from_path(text, Path::new(name))
	}

	/// Create a new source code struct from source code text and a file system path.
	#[must_use]
	pub fn new_from_path(text: &str, name: &Path) -> Self {
		Self {
			text:         text.chars().filter(|c| c != &'\r').collect::<String>().into(),
			name:         name.to_owned(),
			include_path: Vec::new(),
		}
	}

	/// Create a new source code struct by loading a file's contents.
	///
	/// # Errors
	/// If reading the file fails (doesn't exist, permissions wrong, I/O error etc.)
	pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
		let path = if path.is_relative() { std::env::current_dir()?.join(path) } else { path.to_owned() };
		let path = path.canonicalize()?;
		let text = std::fs::read_to_string(&path)?;
		Ok(Self::new_from_path(&text, &path))
	}

	/// Marks this code as included from `parent`, extending the include chain.
	#[must_use]
	pub fn included_from(mut self, parent: &Self) -> Self {
		self.include_path = parent.include_path.clone();
		self.include_path.push(parent.name.clone());
		self
	}

	/// Whether including this code would close an include cycle, i.e. it is one of the files that (transitively)
	/// includes it.
	#[must_use]
	pub fn is_include_cycle(&self) -> bool {
		self.include_path.contains(&self.name)
	}

	/// Returns a pretty-printed variant of the file name of this source code. Files within the working directory are
	/// printed relative to it.
	#[must_use]
	pub fn file_name(&self) -> SharedStr {
		let relative = std::env::current_dir()
			.ok()
			.and_then(|cwd| self.name.strip_prefix(cwd).ok().map(Path::to_path_buf))
			.unwrap_or_else(|| self.name.clone());
		relative.to_string_lossy().to_string().into()
	}

	/// Computes the one-based line and column of a byte offset into the text.
	#[must_use]
	pub fn line_and_column(&self, offset: usize) -> (usize, usize) {
		let offset = offset.min(self.text.len());
		let before = &self.text[.. offset];
		let line = before.matches('\n').count() + 1;
		let column = before.rfind('\n').map_or(offset, |newline| offset - newline - 1) + 1;
		(line, column)
	}
}

impl SourceCode for AssemblyCode {
	fn read_span<'a>(
		&'a self,
		span: &SourceSpan,
		context_lines_before: usize,
		context_lines_after: usize,
	) -> Result<Box<dyn SpanContents<'a> + 'a>, MietteError> {
		let result = self.text.read_span(span, context_lines_before, context_lines_after)?;
		let retval = Box::new(MietteSpanContents::new_named(
			self.file_name().as_str().to_owned(),
			result.data(),
			*result.span(),
			result.line(),
			result.column(),
			result.line_count(),
		));
		Ok(retval)
	}
}

/// Access to source resources, such as included files.
pub trait ResourceResolver: Debug {
	/// Loads the resource named `identifier`. Relative names are interpreted relative to the `parent` resource, if one
	/// is given. The returned code carries no include path yet.
	///
	/// # Errors
	/// If the resource does not exist or cannot be read.
	fn resolve(&self, identifier: &str, parent: Option<&AssemblyCode>) -> Result<AssemblyCode, std::io::Error>;
}

/// Resolves resources on the file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

impl ResourceResolver for FileResolver {
	fn resolve(&self, identifier: &str, parent: Option<&AssemblyCode>) -> Result<AssemblyCode, std::io::Error> {
		let relative_to = parent.and_then(|parent| parent.name.parent()).map(Path::to_path_buf).unwrap_or_default();
		AssemblyCode::from_file(&relative_to.join(identifier))
	}
}

/// Resolves resources from a fixed set of named in-memory texts.
#[derive(Debug, Default, Clone)]
pub struct MemoryResolver {
	files: HashMap<PathBuf, SharedStr>,
}

impl MemoryResolver {
	/// Creates an empty resolver.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a named resource.
	#[must_use]
	pub fn with_file(mut self, name: &str, text: &str) -> Self {
		self.files.insert(PathBuf::from(name), text.into());
		self
	}
}

impl ResourceResolver for MemoryResolver {
	fn resolve(&self, identifier: &str, parent: Option<&AssemblyCode>) -> Result<AssemblyCode, std::io::Error> {
		let sibling = parent.and_then(|parent| parent.name.parent()).map(|directory| directory.join(identifier));
		[sibling, Some(PathBuf::from(identifier))]
			.into_iter()
			.flatten()
			.find_map(|path| self.files.get(&path).map(|text| AssemblyCode::new_from_path(text, &path)))
			.ok_or_else(|| {
				std::io::Error::new(std::io::ErrorKind::NotFound, format!("no in-memory resource named {identifier}"))
			})
	}
}
