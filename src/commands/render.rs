use std::fmt::Write as _;
use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{self, Print, StyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType};
use gridlab::{AgentSnapshot, Appearance, Background, Color, Intensity, RunState, WorldSnapshot};

fn term_color(color: Color, intensity: Intensity) -> style::Color {
    let bright = intensity == Intensity::Bright;
    match color {
        Color::Black if bright => style::Color::DarkGrey,
        Color::Black => style::Color::Black,
        Color::Red if bright => style::Color::Red,
        Color::Red => style::Color::DarkRed,
        Color::Green if bright => style::Color::Green,
        Color::Green => style::Color::DarkGreen,
        Color::Yellow if bright => style::Color::Yellow,
        Color::Yellow => style::Color::DarkYellow,
        Color::Blue if bright => style::Color::Blue,
        Color::Blue => style::Color::DarkBlue,
        Color::Magenta if bright => style::Color::Magenta,
        Color::Magenta => style::Color::DarkMagenta,
        Color::Cyan if bright => style::Color::Cyan,
        Color::Cyan => style::Color::DarkCyan,
        Color::White if bright => style::Color::White,
        Color::White => style::Color::Grey,
    }
}

fn styled(appearance: &Appearance) -> StyledContent<&str> {
    let content = appearance
        .aspect
        .as_str()
        .with(term_color(appearance.color, appearance.intensity));
    match appearance.intensity {
        Intensity::Bright => content.bold(),
        Intensity::Normal => content,
    }
}

pub fn paint(appearance: &Appearance, color: bool) -> String {
    if !color {
        return appearance.aspect.clone();
    }
    styled(appearance).to_string()
}

/// Like [`paint`], on top of the world's background color.
pub fn paint_on(appearance: &Appearance, background: Background, color: bool) -> String {
    if !color {
        return appearance.aspect.clone();
    }
    styled(appearance)
        .on(term_color(background.color, background.intensity))
        .to_string()
}

/// Put a frame on the terminal. Styled output repaints the screen in place,
/// plain output scrolls.
pub fn draw(out: &mut impl Write, text: &str, color: bool) -> io::Result<()> {
    if color {
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    }
    // raw mode: lines need an explicit carriage return
    for line in text.lines() {
        queue!(out, Print(line), Print("\r\n"))?;
    }
    out.flush()
}

pub fn board(snapshot: &WorldSnapshot, color: bool) -> String {
    let mut out = String::new();
    let edge = format!("+{}+", "-".repeat(snapshot.width));
    let _ = writeln!(out, "{}", edge);
    for row in &snapshot.rows {
        out.push('|');
        for cell in row {
            out.push_str(&paint_on(cell, snapshot.background, color));
        }
        out.push_str("|\n");
    }
    let _ = writeln!(out, "{}", edge);
    out
}

pub fn ranking(snapshot: &WorldSnapshot, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>3}   {:<14}{:>16}  {:<12}{}",
        "#", "agent", "energy", "action", "ok"
    );
    for (rank, agent) in snapshot.agents.iter().enumerate() {
        let marker = if snapshot.tracked == Some(agent.id) { '>' } else { ' ' };
        let _ = writeln!(
            out,
            "{:>3}{} {} {:<14}{:>7.2} / {:<7.2} {} {:<10}{}",
            rank + 1,
            marker,
            paint(&agent.appearance, color),
            agent.name,
            agent.energy,
            agent.max_energy,
            agent.action_icon,
            agent.last_action,
            if agent.last_action_succeeded { "yes" } else { "no" }
        );
    }
    out
}

/// The two 3x3 touch maps side by side, top row (`dy = +1`) first.
pub fn touch_maps(agent: &AgentSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<24}  {}", "lost to (-)", "gained from (+)");
    for row in (0..3).rev() {
        let line = |cells: &[[f64; 3]; 3]| {
            cells[row]
                .iter()
                .map(|v| format!("{:>7.2}", v))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let _ = writeln!(
            out,
            "{}   {}",
            line(&agent.touch_negative),
            line(&agent.touch_positive)
        );
    }
    out
}

pub fn frame(snapshot: &WorldSnapshot, state: RunState, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | tick {} | {} | living {}/{} | energy {:.2}",
        snapshot.name,
        snapshot.tick,
        state,
        snapshot.living,
        snapshot.agents.len(),
        snapshot.total_energy
    );
    out.push_str(&board(snapshot, color));
    out.push_str(&ranking(snapshot, color));
    if let Some(agent) = snapshot.tracked_agent() {
        let _ = writeln!(out, "\ntracking {} at energy {:.2}", agent.name, agent.energy);
        out.push_str(&touch_maps(agent));
    }
    if matches!(state, RunState::Paused | RunState::StepByStep) {
        out.push_str("\n[enter] step  [r] resume  [q] quit\n");
    } else {
        out.push_str("\n[p] pause  [q] quit\n");
    }
    out
}

pub fn final_results(started: &str, ended: &str, ticks: u64, seed: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Lil' Grid Lab v{}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "{:<20}{}", "- Started:", started);
    let _ = writeln!(out, "{:<20}{}", "- Ended:", ended);
    let _ = writeln!(out, "{:<20}{}", "- Steps run:", ticks);
    let _ = writeln!(out, "{:<20}{}", "- Random seed used:", seed);
    out
}
