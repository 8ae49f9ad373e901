use std::io::{BufRead, Write};

use libqplot::axis::AxisMeta;
use libqplot::hints::{HintRequest, PendingHints, RawAxisHint, RawAxisHints};

/// Ask on the terminal for the axes of a raw matrix until the answer is valid.
///
/// If the terminal is closed the request is dropped, which abandons the buffer.
pub fn answer_on_terminal(pending: PendingHints) {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    answer(pending, &mut stdin.lock(), &mut stdout.lock());
}

pub fn answer<R: BufRead, W: Write>(pending: PendingHints, input: &mut R, output: &mut W) {
    let mut pending = pending;
    loop {
        let raw = match read_hints(&pending.request, input, output) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Could not read axis hints for {}: {e}", pending.request.name);
                return;
            }
        };
        match pending.submit(&raw) {
            Ok(()) => return,
            Err((returned, e)) => {
                log::warn!("{e}. Please enter the axes again.");
                pending = returned;
            }
        }
    }
}

fn read_hints<R: BufRead, W: Write>(
    request: &HintRequest,
    input: &mut R,
    output: &mut W,
) -> std::io::Result<RawAxisHints> {
    writeln!(
        output,
        "{} is a raw {} x {} matrix without axes.",
        request.location.display(),
        request.matrix_dimensions.first().copied().unwrap_or(0),
        request.matrix_dimensions.get(1).copied().unwrap_or(0)
    )?;
    let x = read_axis("x (rows)", input, output)?;
    let y = read_axis("y (columns)", input, output)?;
    let z = AxisMeta::new(
        &ask("z name", input, output)?,
        &ask("z unit", input, output)?,
    );
    Ok(RawAxisHints { x, y, z })
}

fn read_axis<R: BufRead, W: Write>(
    axis: &str,
    input: &mut R,
    output: &mut W,
) -> std::io::Result<RawAxisHint> {
    Ok(RawAxisHint {
        start: ask(&format!("{axis} start"), input, output)?,
        end: ask(&format!("{axis} end"), input, output)?,
        name: ask(&format!("{axis} name"), input, output)?,
        unit: ask(&format!("{axis} unit"), input, output)?,
    })
}

fn ask<R: BufRead, W: Write>(
    field: &str,
    input: &mut R,
    output: &mut W,
) -> std::io::Result<String> {
    write!(output, "  {field}: ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "terminal closed",
        ));
    }
    Ok(line.trim().to_string())
}
