//! RCS-style diff application
//!
//! `Rcs-diff` responses carry a patch in the format produced by `diff -n`:
//!
//! ```text
//! d3 2        delete 2 lines starting at line 3
//! a7 1        append 1 line after line 7
//! new line
//! ```
//!
//! Line numbers refer to the original file and commands come in
//! ascending order.

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
	Delete { line: usize, count: usize },
	Add { after: usize, lines: Vec<&'a [u8]> },
}

fn parse_header(line: &[u8]) -> Result<(u8, usize, usize), String> {
	let text = String::from_utf8_lossy(line);
	let text = text.trim_end();
	let mut chars = text.chars();
	let op = chars.next().ok_or("empty diff command")?;
	let (start, count) = chars
		.as_str()
		.split_once(' ')
		.ok_or_else(|| format!("bad diff command '{}'", text))?;
	let start = start.parse::<usize>().map_err(|_| format!("bad line number in '{}'", text))?;
	let count = count.parse::<usize>().map_err(|_| format!("bad line count in '{}'", text))?;
	match op {
		'a' => Ok((b'a', start, count)),
		'd' => Ok((b'd', start, count)),
		_ => Err(format!("unknown diff command '{}'", text)),
	}
}

fn parse(diff: &[u8]) -> Result<Vec<Command<'_>>, String> {
	let mut lines = diff.split_inclusive(|&b| b == b'\n');
	let mut commands = Vec::new();
	while let Some(header) = lines.next() {
		if header == b"\n" {
			continue;
		}
		match parse_header(header)? {
			(b'd', line, count) => commands.push(Command::Delete { line, count }),
			(_, after, count) => {
				let mut added = Vec::with_capacity(count.min(1024));
				for _ in 0..count {
					added.push(lines.next().ok_or("diff ends inside an add block")?);
				}
				commands.push(Command::Add { after, lines: added });
			}
		}
	}
	Ok(commands)
}

/// Apply `diff` to `original`, returning the patched content.
pub fn apply(original: &[u8], diff: &[u8]) -> Result<Vec<u8>, String> {
	let source: Vec<&[u8]> = original.split_inclusive(|&b| b == b'\n').collect();
	let mut out = Vec::with_capacity(original.len() + diff.len());
	let mut cursor = 0usize;

	for command in parse(diff)? {
		match command {
			Command::Delete { line, count } => {
				let start = line.checked_sub(1).ok_or("diff deletes line 0")?;
				let end = start.checked_add(count).filter(|&end| start >= cursor && end <= source.len());
				let Some(end) = end else {
					return Err(format!("delete of {} lines at line {} out of range", count, line));
				};
				source[cursor..start].iter().for_each(|l| out.extend_from_slice(l));
				cursor = end;
			}
			Command::Add { after, lines } => {
				if after < cursor || after > source.len() {
					return Err(format!("append after line {} out of range", after));
				}
				source[cursor..after].iter().for_each(|l| out.extend_from_slice(l));
				cursor = after;
				lines.iter().for_each(|l| out.extend_from_slice(l));
			}
		}
	}
	source[cursor..].iter().for_each(|l| out.extend_from_slice(l));
	Ok(out)
}


// vim: ts=4
