//! Operator console used by [`InteractiveConsent`](super::InteractiveConsent).

// std
use std::io::{self, BufRead, Write};
// self
use crate::_prelude::*;

/// Shows the consent URL to the operator and reads back one line.
///
/// Implementations block; this is the only blocking call in a resolution.
pub trait ConsentPrompt
where
	Self: Send + Sync,
{
	/// Presents `authorize_url` and returns the next input line, or `None` at end of input.
	fn ask(&self, authorize_url: &Url) -> io::Result<Option<String>>;
}

/// Prompt bound to the process's stdout and stdin.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdioPrompt;
impl ConsentPrompt for StdioPrompt {
	fn ask(&self, authorize_url: &Url) -> io::Result<Option<String>> {
		let stdin = io::stdin();

		present_and_read(&mut stdin.lock(), &mut io::stdout().lock(), authorize_url)
	}
}

/// Prompt over any reader/writer pair; used for scripted consoles and tests.
#[derive(Debug)]
pub struct LinePrompt<R, W> {
	io: Mutex<(R, W)>,
}
impl<R, W> LinePrompt<R, W>
where
	R: BufRead + Send,
	W: Write + Send,
{
	/// Creates a prompt reading from `reader` and writing to `writer`.
	pub fn new(reader: R, writer: W) -> Self {
		Self { io: Mutex::new((reader, writer)) }
	}

	/// Returns the reader and writer.
	pub fn into_parts(self) -> (R, W) {
		self.io.into_inner()
	}
}
impl<R> LinePrompt<R, Vec<u8>> {
	/// Everything written to the operator so far.
	pub fn transcript(&self) -> String {
		String::from_utf8_lossy(&self.io.lock().1).into_owned()
	}
}
impl<R, W> ConsentPrompt for LinePrompt<R, W>
where
	R: BufRead + Send,
	W: Write + Send,
{
	fn ask(&self, authorize_url: &Url) -> io::Result<Option<String>> {
		let mut guard = self.io.lock();
		let (reader, writer) = &mut *guard;

		present_and_read(reader, writer, authorize_url)
	}
}

fn present_and_read(
	reader: &mut impl BufRead,
	writer: &mut impl Write,
	authorize_url: &Url,
) -> io::Result<Option<String>> {
	writeln!(
		writer,
		"Go to the following link in your browser then type the authorization code:\n{authorize_url}"
	)?;
	writer.flush()?;

	let mut line = String::new();

	if reader.read_line(&mut line)? == 0 {
		return Ok(None);
	}

	Ok(Some(line))
}
