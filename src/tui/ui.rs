//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::cpu::{Flag, Region};
use crate::isa::Register;
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(55),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: screen, memory and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(10),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_screen(frame, right_chunks[0], app);
    draw_memory(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2], app);
}

/// Draw disassembly view around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:04x}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw the register file.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = &app.machine.cpu;
    let reg = |r: Register| {
        vec![
            Span::raw(format!("{:>4}: ", r.name())),
            Span::styled(format!("{:04x}", cpu.regs.get(r)), Style::default().fg(Color::White)),
        ]
    };

    let row = |regs: &[Register]| Line::from(regs.iter().flat_map(|&r| reg(r)).collect::<Vec<_>>());

    let content = vec![
        row(&[Register::A, Register::B, Register::C, Register::D]),
        row(&[Register::E, Register::Hl, Register::Sr, Register::Flag]),
        Line::from(vec![
            Span::raw("  PC: "),
            Span::styled(format!("{:04x}", cpu.regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("  SP: "),
            Span::styled(format!("{:04x}", cpu.regs.sp), Style::default().fg(Color::White)),
            Span::raw("   "),
            flag_span("Z", cpu.regs.flag(Flag::Zero)),
            flag_span("N", cpu.regs.flag(Flag::Negative)),
            flag_span("C", cpu.regs.flag(Flag::Carry)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.machine.cycles()), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", cpu.state),
                if cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

fn flag_span(name: &'static str, set: bool) -> Span<'static> {
    if set {
        Span::styled(name, Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::styled(name, Style::default().fg(Color::DarkGray))
    }
}

/// Draw the VRAM text screen.
fn draw_screen(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows: Vec<Line> = app.screen_rows().into_iter().map(Line::from).collect();

    let screen = Paragraph::new(rows)
        .block(Block::default()
            .title(" Screen ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)));

    frame.render_widget(screen, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let cpu = &app.machine.cpu;

    let items: Vec<ListItem> = (0..visible_rows)
        .map_while(|row| app.mem_scroll.checked_add(row as u16))
        .map(|addr| {
            let value = app.machine.bus.read(addr);
            let tag = match Region::of(addr) {
                Region::Rom => "ROM",
                Region::Vram => "VRM",
                Region::Ram => "RAM",
                Region::Keyboard => "KBD",
                Region::Unmapped => "---",
            };
            let text = format!("{} {:04x}: {:04x}  {}", tag, addr, value, value);

            let style = if addr == cpu.regs.sp {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let lines = if app.input_mode {
        vec![
            Line::from("Typing to the emulated keyboard"),
            Line::from("Esc: back to debugger controls"),
        ]
    } else {
        vec![
            Line::from("s: Step  r: Run  p: Pause  b: Breakpoint  i: Type"),
            Line::from("x: Reset  ↑↓/PgUp/PgDn: Scroll memory  q: Quit"),
        ]
    };

    let help = Paragraph::new(lines)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default()
            .title(" Help ")
            .borders(Borders::ALL));

    frame.render_widget(help, area);
}
