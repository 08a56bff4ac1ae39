use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode, Page};
use crate::view::{DialogView, LogStatus, LogView, ResourceViewer};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if let Some(dialog) = app.dialog() {
        render_dialog(frame, &dialog);
    }
    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(
        &mut spans,
        format!(" 󱃾 {} ", compact_text(app.context(), 24)),
        Color::White,
        PL_A,
        PL_B,
    );
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(app.cluster(), 24)),
        Color::White,
        PL_B,
        PL_C,
    );
    let location = match app.page() {
        Some(Page::Resource(view)) => resource_location(view.as_ref()),
        Some(Page::Logs(view)) => view.title(),
        None => String::new(),
    };
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&location, 48)),
        Color::White,
        PL_C,
        BG,
    );
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG).fg(Color::White)),
        area,
    );
}

fn resource_location(view: &dyn ResourceViewer) -> String {
    let path = view.current_path();
    if path.is_empty() {
        format!("{} (all)", view.gvr().title())
    } else {
        format!("{} ({path})", view.gvr().title())
    }
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    match app.page() {
        Some(Page::Resource(view)) => render_table(frame, area, view.as_ref()),
        Some(Page::Logs(view)) => render_logs(frame, area, view),
        None => {}
    }
}

fn panel_block(title: String, border: Color) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(PANEL))
}

fn render_table(frame: &mut Frame, area: Rect, view: &dyn ResourceViewer) {
    let table = view.table();
    if let Some(error) = &table.error {
        let panel = Paragraph::new(Text::from(error.clone()))
            .wrap(Wrap { trim: false })
            .block(panel_block(format!("{} Error", view.gvr().title()), ERROR))
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    let header_row = Row::new(table.headers.iter().map(|header| {
        Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = table.rows.iter().map(|row| {
        Row::new(
            row.columns
                .iter()
                .map(|column| Cell::from(column.clone()).style(Style::default().fg(Color::White))),
        )
    });

    let border = if view.is_suspended() { MUTED } else { ACCENT };
    let title = format!("{} ({})", view.gvr().title(), table.rows.len());
    let widget = Table::new(rows, column_constraints(table.headers.len()))
        .header(header_row)
        .block(panel_block(title, border))
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    if !table.rows.is_empty() {
        state.select(Some(table.selected));
    }
    frame.render_stateful_widget(widget, area, &mut state);
}

fn render_logs(frame: &mut Frame, area: Rect, view: &LogView) {
    let height = area.height.saturating_sub(2) as usize;
    let lines = view
        .visible(height)
        .into_iter()
        .map(|line| {
            let color = if line.is_error { ERROR } else { Color::White };
            Line::from(Span::styled(line.text, Style::default().fg(color)))
        })
        .collect::<Vec<_>>();

    let (status, border) = match view.status() {
        LogStatus::Streaming => ("streaming", ACCENT),
        LogStatus::Ended => ("ended", MUTED),
        LogStatus::Failed(_) => ("failed", ERROR),
    };
    let title = format!("{} [{status}] ({})", view.title(), view.len());
    let paragraph = Paragraph::new(lines)
        .block(panel_block(title, border))
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if app.mode() == InputMode::Command {
        let mut spans = Vec::new();
        push_powerline_segment(&mut spans, " 󰘳 cmd ", Color::Black, ACCENT, PL_B);
        push_powerline_segment(
            &mut spans,
            format!(" :{} ", app.input()),
            Color::White,
            PL_B,
            BG,
        );
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let mut spans = Vec::new();
    let (mode_label, mode_fg, mode_bg) = if app.read_only() {
        (" 󰌾 ro ", Color::Black, WARN)
    } else {
        (" 󰘳 nrm ", Color::White, PL_A)
    };
    let flash = app.flash();
    let (status_text, status_fg, status_bg) = match &flash {
        Some(flash) if flash.is_error() => (flash.message.clone(), Color::Black, ERROR),
        Some(flash) => (flash.message.clone(), Color::White, PL_B),
        None => (format!("ns {}", app.scope()), Color::White, PL_B),
    };
    push_powerline_segment(&mut spans, mode_label, mode_fg, mode_bg, status_bg);
    let status_width = area.width.saturating_sub(24).min(80) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&status_text, status_width.max(24))),
        status_fg,
        status_bg,
        BG,
    );

    let hints = app
        .hints()
        .iter()
        .flat_map(|(key, description)| {
            [
                Span::styled(format!("<{key}>"), Style::default().fg(ACCENT)),
                Span::styled(format!(" {description}  "), Style::default().fg(MUTED)),
            ]
        })
        .collect::<Vec<_>>();

    let min_left = 28u16;
    let right_width = (spans_width(&hints) as u16).min(area.width.saturating_sub(min_left));
    if right_width == 0 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(hints))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn render_dialog(frame: &mut Frame, dialog: &DialogView) {
    let area = centered_rect(60, 50, frame.area());
    frame.render_widget(Clear, area);

    let label_width = dialog
        .fields
        .iter()
        .map(|field| field.label.chars().count())
        .max()
        .unwrap_or(0);
    let mut lines = Vec::with_capacity(dialog.fields.len() + 2);
    for field in &dialog.fields {
        let (marker, value_style) = if field.focused {
            ("󰜴 ", Style::default().fg(Color::Black).bg(ACCENT))
        } else {
            ("  ", Style::default().fg(Color::White))
        };
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(ACCENT)),
            Span::styled(
                format!("{:<label_width$}  ", field.label),
                Style::default().fg(MUTED),
            ),
            Span::styled(field.value.clone(), value_style),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        dialog.hint.clone(),
        Style::default().fg(MUTED),
    )));

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel_block(dialog.title.clone(), WARN))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "kestrel help  scope:{}  depth:{}",
            app.scope(),
            app.depth()
        )),
        Line::from(""),
        Line::from(":<kind> switch kind  :ns <name|all> switch namespace  :q quit"),
        Line::from(""),
    ];
    for (key, description) in app.hints().iter() {
        lines.push(Line::from(vec![
            Span::styled(format!("{key:>8}  "), Style::default().fg(ACCENT)),
            Span::raw(description.to_string()),
        ]));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel_block("Help".to_string(), ACCENT))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}
