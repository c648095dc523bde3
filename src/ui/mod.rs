mod preview;

use std::sync::OnceLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect, Alignment},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::{App, Popup};
use crate::grid::export::DOWNLOAD_FILENAME;
use crate::grid::session::WidgetState;
use crate::grid::Position;
use crate::theme::Theme;

// Theme is resolved from config once at startup
static THEME: OnceLock<Theme> = OnceLock::new();

/// Install the theme before the first frame; later calls are ignored
pub fn init_theme(theme: Theme) {
    let _ = THEME.set(theme);
}

fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::default)
}

// Helper functions to get theme colors
fn accent() -> Color { theme().accent }
fn accent_bright() -> Color { theme().accent_bright }
fn inactive() -> Color { theme().inactive }
fn success() -> Color { theme().success }
fn warning() -> Color { theme().warning }
fn danger() -> Color { theme().danger }
fn text() -> Color { theme().text }
fn text_dim() -> Color { theme().text_dim }
fn bg_selected() -> Color { theme().bg_selected }
fn header() -> Color { theme().header }

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([
            Constraint::Length(1),               // Info line
            Constraint::Min(9),                  // Grid + preview
            Constraint::Length(1),               // Footer
        ])
        .split(area);

    // Stack the boxes on narrow terminals
    let body_direction = if area.width < 90 { Direction::Vertical } else { Direction::Horizontal };
    let body = Layout::default()
        .direction(body_direction)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[1]);

    draw_info_line(f, app, chunks[0]);
    draw_grid_box(f, app, body[0]);
    draw_preview_box(f, app, body[1]);
    draw_footer(f, app, chunks[2]);

    // Draw popups on top
    match app.popup {
        Popup::None => {}
        Popup::FileBrowser => draw_file_browser(f, app),
        Popup::Help => draw_help_popup(f),
        Popup::Confirm => draw_confirm_popup(f, app),
    }
}

fn draw_info_line(f: &mut Frame, app: &App, area: Rect) {
    // Priority: status message > widget state
    let line = if let Some(ref status) = app.status_message {
        Line::from(vec![
            Span::styled(status, Style::default().fg(warning())),
        ])
    } else {
        let count = app.session.registry().count();
        let dims = app
            .layout()
            .map(|l| format!("{}×{}", l.width, l.height))
            .unwrap_or_default();

        let mut spans = match app.state() {
            WidgetState::Empty => vec![
                Span::styled("󰋩 No images │ Enter picks one for the selected slot", Style::default().fg(text_dim())),
            ],
            WidgetState::Editing => vec![
                Span::styled(format!("󰋩 {}/9 images", count), Style::default().fg(text())),
                Span::styled(" │ ", Style::default().fg(text_dim())),
                Span::styled(dims, Style::default().fg(text_dim())),
                Span::styled(" │ g to compose", Style::default().fg(text_dim())),
            ],
            WidgetState::Composing => vec![
                Span::styled("󰔟 Composing...", Style::default().fg(accent())),
            ],
            WidgetState::Previewing => vec![
                Span::styled("󰄬 Preview ready", Style::default().fg(success())),
                Span::styled(" │ ", Style::default().fg(text_dim())),
                Span::styled(dims, Style::default().fg(text())),
                Span::styled(" │ s saves ", Style::default().fg(text_dim())),
                Span::styled(DOWNLOAD_FILENAME, Style::default().fg(accent_bright())),
            ],
        };

        if let Some(ref saved) = app.last_saved {
            spans.push(Span::styled(" │ last: ", Style::default().fg(text_dim())));
            spans.push(Span::styled(saved.display().to_string(), Style::default().fg(text_dim())));
        }

        Line::from(spans)
    };

    let info = Paragraph::new(line).alignment(Alignment::Center);
    f.render_widget(info, area);
}

fn draw_grid_box(f: &mut Frame, app: &App, area: Rect) {
    let count = app.session.registry().count();
    let block = Block::default()
        .title(Span::styled(format!(" Grid ({}/9) ", count), Style::default().fg(accent()).add_modifier(Modifier::BOLD)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent()));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(1, 3), Constraint::Ratio(1, 3)])
        .split(inner);

    for (r, row_area) in rows.iter().enumerate() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(1, 3), Constraint::Ratio(1, 3)])
            .split(*row_area);

        for (c, cell_area) in cols.iter().enumerate() {
            if let Some(pos) = Position::at(r as u8, c as u8) {
                draw_slot(f, app, pos, *cell_area);
            }
        }
    }
}

fn draw_slot(f: &mut Frame, app: &App, pos: Position, area: Rect) {
    let is_selected = app.selected == pos;
    let payload = app.session.registry().get(pos);
    let off_canvas = payload.is_some() && app.layout().map(|l| !l.contains(pos)).unwrap_or(false);

    let border_color = if is_selected {
        accent()
    } else if off_canvas {
        warning()
    } else if payload.is_some() {
        success()
    } else {
        inactive()
    };
    let title_style = if is_selected {
        Style::default().fg(accent()).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(border_color)
    };

    let block = Block::default()
        .title(Span::styled(format!(" {} ", pos), title_style))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let lines = match payload {
        Some(p) => {
            let mut lines = vec![
                Line::styled(p.name().to_string(), Style::default().fg(accent_bright())),
                Line::styled(format!("{} · {}", p.mime(), format_bytes(p.size() as u64)), Style::default().fg(text_dim())),
            ];
            if off_canvas {
                lines.push(Line::styled("⚠ outside canvas", Style::default().fg(warning())));
            }
            lines
        }
        None if is_selected => vec![
            Line::styled("empty", Style::default().fg(text_dim())),
            Line::styled("Enter to pick", Style::default().fg(accent())),
        ],
        None => vec![Line::styled("empty", Style::default().fg(text_dim()))],
    };

    let style = if is_selected {
        Style::default().bg(bg_selected()).fg(text())
    } else {
        Style::default()
    };

    let content = Paragraph::new(lines)
        .style(style)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);

    f.render_widget(content, area);
}

fn draw_preview_box(f: &mut Frame, app: &App, area: Rect) {
    let result = app.session.result();
    let title = match result {
        Some(r) => format!(" Preview {}×{} ", r.width(), r.height()),
        None => " Preview ".to_string(),
    };
    let border_color = if result.is_some() { success() } else { inactive() };

    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(border_color)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let inner = block.inner(area);

    let content = if let Some(r) = result {
        Paragraph::new(preview::thumbnail(&r.raster, inner.width, inner.height))
            .alignment(Alignment::Center)
    } else if app.state() == WidgetState::Composing {
        let secs = app.compose_started.map(|t| t.elapsed().as_secs()).unwrap_or(0);
        Paragraph::new(vec![
            Line::from(""),
            Line::styled(format!("󰔟 Composing... {}s", secs), Style::default().fg(accent())),
        ])
        .alignment(Alignment::Center)
    } else if let Some(layout) = app.layout() {
        Paragraph::new(vec![
            Line::from(""),
            Line::styled(
                format!("{} row(s), {}×{} px", layout.rows, layout.width, layout.height),
                Style::default().fg(text()),
            ),
            Line::from(vec![
                Span::styled("Press ", Style::default().fg(text_dim())),
                Span::styled("g", Style::default().fg(accent())),
                Span::styled(" to compose", Style::default().fg(text_dim())),
            ]),
        ])
        .alignment(Alignment::Center)
    } else {
        Paragraph::new(vec![
            Line::from(""),
            Line::styled("Nothing to preview yet", Style::default().fg(text_dim())),
        ])
        .alignment(Alignment::Center)
    };

    f.render_widget(content.block(block), area);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let mut hints: Vec<(&str, &str)> = vec![
        ("←↑↓→", "Nav"),
        ("1-9", "Jump"),
        ("Enter", "Pick"),
    ];
    if app.session.registry().get(app.selected).is_some() {
        hints.push(("d", "Remove"));
    }
    match app.state() {
        WidgetState::Editing => hints.push(("g", "Compose")),
        WidgetState::Previewing => hints.push(("s", "Save")),
        _ => {}
    }
    hints.push(("?", "Help"));
    hints.push(("q", "Quit"));

    // Responsive: show fewer hints on narrow terminals
    let max_hints = if area.width < 60 { 4 } else if area.width < 80 { 5 } else { hints.len() };

    let hint_spans: Vec<Span> = hints
        .iter()
        .take(max_hints)
        .flat_map(|(key, action)| {
            vec![
                Span::styled(*key, Style::default().fg(accent())),
                Span::styled(format!(" {} │ ", action), Style::default().fg(text_dim())),
            ]
        })
        .collect();

    let footer = Paragraph::new(Line::from(hint_spans))
        .alignment(Alignment::Center);

    f.render_widget(footer, area);
}

fn draw_file_browser(f: &mut Frame, app: &App) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 90 } else { 70 },
        if area.height < 30 { 85 } else { 70 },
        area
    );

    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(format!(" 󰋩 Pick image for position {} ", app.selected), Style::default().fg(accent())))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent()));

    f.render_widget(block, popup_area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(2),
        ])
        .split(popup_area);

    let path_str = app.browser_path.to_string_lossy();
    let path_display = Paragraph::new(Line::from(vec![
        Span::styled("󰉋 ", Style::default().fg(accent())),
        Span::styled(path_str.as_ref(), Style::default().fg(text())),
    ]))
    .block(Block::default().borders(Borders::BOTTOM).border_style(Style::default().fg(inactive())));
    f.render_widget(path_display, inner[0]);

    // Keep the selection visible in long directories
    let visible = inner[1].height as usize;
    let skip = app.browser_selected.saturating_sub(visible.saturating_sub(1));

    let rows: Vec<Row> = if app.browser_entries.is_empty() {
        vec![Row::new(vec![
            Span::styled("  No images in this directory", Style::default().fg(text_dim())),
        ])]
    } else {
        app.browser_entries
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, entry)| {
                let icon = if entry.is_dir { "󰉋" } else { "󰋩" };
                let icon_color = if entry.is_dir { accent() } else { success() };

                let row_style = if i == app.browser_selected {
                    Style::default()
                        .bg(bg_selected())
                        .fg(text())
                } else {
                    Style::default()
                };

                Row::new(vec![
                    Span::styled(format!("  {} ", icon), Style::default().fg(icon_color)),
                    Span::styled(&entry.name, Style::default().fg(text())),
                ])
                .style(row_style)
            })
            .collect()
    };

    let widths = [Constraint::Length(5), Constraint::Percentage(90)];
    let table = Table::new(rows, widths);
    f.render_widget(table, inner[1]);

    let hint = Paragraph::new(Line::from(vec![
        Span::styled("j/k", Style::default().fg(accent())),
        Span::raw(" nav │ "),
        Span::styled("Enter", Style::default().fg(accent())),
        Span::raw(" select │ "),
        Span::styled("Backspace", Style::default().fg(accent())),
        Span::raw(" up │ "),
        Span::styled("~", Style::default().fg(accent())),
        Span::raw(" home │ "),
        Span::styled("Esc", Style::default().fg(accent())),
        Span::raw(" cancel"),
    ]))
    .alignment(Alignment::Center)
    .style(Style::default().fg(text_dim()));
    f.render_widget(hint, inner[2]);
}

fn draw_help_popup(f: &mut Frame) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 95 } else { 70 },
        if area.height < 40 { 95 } else { 85 },
        area
    );

    f.render_widget(Clear, popup_area);

    let help_text = vec![
        Line::from(Span::styled("═══ Slots ═══", Style::default().fg(header()).add_modifier(Modifier::BOLD))),
        Line::from(vec![
            Span::styled("  ←↑↓→ hjkl ", Style::default().fg(accent())),
            Span::raw("Move between positions 1-9"),
        ]),
        Line::from(vec![
            Span::styled("  1-9       ", Style::default().fg(accent())),
            Span::raw("Jump to a position"),
        ]),
        Line::from(vec![
            Span::styled("  Enter     ", Style::default().fg(accent())),
            Span::raw("Pick an image for the selected position"),
        ]),
        Line::from(vec![
            Span::styled("  d         ", Style::default().fg(accent())),
            Span::raw("Remove the selected image"),
        ]),
        Line::from(vec![
            Span::styled("  X         ", Style::default().fg(accent())),
            Span::raw("Remove all images"),
        ]),
        Line::from(""),
        Line::from(Span::styled("═══ Output ═══", Style::default().fg(header()).add_modifier(Modifier::BOLD))),
        Line::from(vec![
            Span::styled("  g         ", Style::default().fg(accent())),
            Span::raw("Compose the grid (300px cells, 10px gaps)"),
        ]),
        Line::from(vec![
            Span::styled("  s         ", Style::default().fg(accent())),
            Span::raw(format!("Save the preview as {}", DOWNLOAD_FILENAME)),
        ]),
        Line::from(vec![
            Span::raw("            Rows follow the image count: 1-3 images make one row,"),
        ]),
        Line::from(vec![
            Span::raw("            so images placed below it are left out"),
        ]),
        Line::from(""),
        Line::from(Span::styled("═══ Command Line ═══", Style::default().fg(header()).add_modifier(Modifier::BOLD))),
        Line::from(vec![
            Span::styled("  ninegrid -i 1=a.png -i 2=b.jpg      ", Style::default().fg(accent())),
            Span::raw("Compose and save"),
        ]),
        Line::from(vec![
            Span::styled("  ninegrid -i 1=a.png --data-uri      ", Style::default().fg(accent())),
            Span::raw("Print the PNG as a data URI"),
        ]),
        Line::from(vec![
            Span::styled("  ninegrid -i 1=a.png --json          ", Style::default().fg(accent())),
            Span::raw("JSON summary for scripts"),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", Style::default().fg(text_dim())),
            Span::styled("?", Style::default().fg(accent())),
            Span::styled("/", Style::default().fg(text_dim())),
            Span::styled("Esc", Style::default().fg(accent())),
            Span::styled(" to close", Style::default().fg(text_dim())),
        ]),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(Span::styled(" 󰋖 ninegrid Help ", Style::default().fg(accent())))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(help, popup_area);
}

fn draw_confirm_popup(f: &mut Frame, app: &App) {
    let popup_area = centered_rect(40, 20, f.area());

    f.render_widget(Clear, popup_area);

    let confirm = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(app.confirm_message.as_str(), Style::default().fg(warning()))),
        Line::from(""),
        Line::from(vec![
            Span::styled("  y", Style::default().fg(success()).add_modifier(Modifier::BOLD)),
            Span::raw(" Yes   "),
            Span::styled("n", Style::default().fg(danger()).add_modifier(Modifier::BOLD)),
            Span::raw(" No"),
        ]),
    ])
    .block(
        Block::default()
            .title(Span::styled(" Confirm ", Style::default().fg(warning())))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(warning())),
    )
    .alignment(Alignment::Center);

    f.render_widget(confirm, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Format bytes to human-readable string
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;

    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
