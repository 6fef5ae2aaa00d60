/// Terminal mount target: presents frames as half blocks or ASCII art
use cadium_core::{Color as Rgb, FrameBuffer, MountTarget, ViewerError};
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal, QueueableCommand,
};
use std::io::{self, stdout, Write};

/// Character luminosity ramp for shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Rows kept free above the canvas for the status line
pub const STATUS_ROWS: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceMode {
    /// Two truecolor pixels per cell using the upper half block
    HalfBlock,
    /// One pixel per cell, shaded with the luminosity ramp
    Ascii,
}

impl SurfaceMode {
    /// Canvas size in pixels for a terminal of `cols` x `rows` cells
    pub fn client_size(self, cols: u16, rows: u16) -> (u32, u32) {
        let rows = rows.saturating_sub(STATUS_ROWS).max(1) as u32;
        let cols = cols.max(1) as u32;
        match self {
            Self::HalfBlock => (cols, rows * 2),
            Self::Ascii => (cols, rows),
        }
    }
}

/// The controlling terminal as a viewport mount target.
///
/// `attach` switches to raw mode on the alternate screen, `detach` restores
/// the terminal.
pub struct TerminalSurface {
    mode: SurfaceMode,
    attached: bool,
}

impl TerminalSurface {
    pub fn new(mode: SurfaceMode) -> Self {
        Self {
            mode,
            attached: false,
        }
    }

    pub fn mode(&self) -> SurfaceMode {
        self.mode
    }
}

/// Raw mode first, then the screen; raw mode is undone if the screen fails.
fn enter_raw_screen(
    raw_on: impl FnOnce() -> io::Result<()>,
    screen: impl FnOnce() -> io::Result<()>,
    raw_off: impl FnOnce() -> io::Result<()>,
) -> io::Result<()> {
    raw_on()?;
    if let Err(err) = screen() {
        let _ = raw_off();
        return Err(err);
    }
    Ok(())
}

fn surface_error(err: io::Error) -> ViewerError {
    ViewerError::Surface(err.to_string())
}

impl MountTarget for TerminalSurface {
    fn client_size(&self) -> (u32, u32) {
        let (cols, rows) = terminal::size().unwrap_or((80, 24));
        self.mode.client_size(cols, rows)
    }

    fn attach(&mut self) -> Result<(), ViewerError> {
        enter_raw_screen(
            terminal::enable_raw_mode,
            || execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide),
            terminal::disable_raw_mode,
        )
        .map_err(surface_error)?;
        self.attached = true;
        Ok(())
    }

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), ViewerError> {
        let mut out = stdout().lock();
        encode_frame(frame, self.mode, &mut out).map_err(surface_error)?;
        out.flush().map_err(surface_error)
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        // Best effort: the terminal may already be gone
        let _ = execute!(stdout(), ResetColor, terminal::LeaveAlternateScreen, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.detach();
    }
}

fn rgb(px: [u8; 4]) -> Color {
    Color::Rgb {
        r: px[0],
        g: px[1],
        b: px[2],
    }
}

/// Pick the ramp character for a pixel
fn shade_char(px: [u8; 4]) -> char {
    let brightness = Rgb::from_rgb8(px[0], px[1], px[2]).luminance();
    let index = (brightness * (LUMINOSITY_RAMP.len() - 1) as f32).round() as usize;
    LUMINOSITY_RAMP[index.min(LUMINOSITY_RAMP.len() - 1)]
}

/// Queue `frame` below the status line
pub fn encode_frame<W: Write>(frame: &FrameBuffer, mode: SurfaceMode, writer: &mut W) -> std::io::Result<()> {
    match mode {
        SurfaceMode::HalfBlock => encode_half_blocks(frame, writer)?,
        SurfaceMode::Ascii => encode_ascii(frame, writer)?,
    }
    writer.queue(ResetColor)?;
    Ok(())
}

fn encode_half_blocks<W: Write>(frame: &FrameBuffer, writer: &mut W) -> std::io::Result<()> {
    let (width, height) = (frame.width(), frame.height());
    for row in 0..height.div_ceil(2) {
        writer.queue(cursor::MoveTo(0, row as u16 + STATUS_ROWS))?;
        let mut last: Option<(Color, Color)> = None;
        for x in 0..width {
            let top = rgb(frame.pixel(x, row * 2));
            let bottom = if row * 2 + 1 < height {
                rgb(frame.pixel(x, row * 2 + 1))
            } else {
                top
            };
            if last != Some((top, bottom)) {
                writer.queue(SetForegroundColor(top))?;
                writer.queue(SetBackgroundColor(bottom))?;
                last = Some((top, bottom));
            }
            writer.queue(Print('▀'))?;
        }
    }
    Ok(())
}

fn encode_ascii<W: Write>(frame: &FrameBuffer, writer: &mut W) -> std::io::Result<()> {
    for y in 0..frame.height() {
        writer.queue(cursor::MoveTo(0, y as u16 + STATUS_ROWS))?;
        for x in 0..frame.width() {
            let c = shade_char(frame.pixel(x, y));

            // Color based on character intensity
            let color = match c {
                ' ' | '.' | ':' => Color::DarkGrey,
                '-' | '=' => Color::Grey,
                '+' | '*' => Color::White,
                '#' | '%' | '@' => Color::Cyan,
                _ => Color::White,
            };

            writer.queue(SetForegroundColor(color))?;
            writer.queue(Print(c))?;
        }
    }
    Ok(())
}
