//! TUI rendering using ratatui.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table};
use ratatui::Frame;

use ayu_core::event::{EventKind, NodeType, Status};
use ayu_core::session::Session;
use ayu_core::tree::TreeFilter;

use super::app::{App, View};

/// Render the current view.
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // counters
            Constraint::Min(3),    // main content
            Constraint::Length(1), // selected node
            Constraint::Length(1), // status bar
        ])
        .split(f.area());

    let session = app.session.read();
    render_header(f, app, &session, chunks[0]);
    match app.current_view {
        View::Tree => render_tree(f, app, &session, chunks[1]),
        View::Coverage => render_coverage(f, &session, chunks[1]),
        View::Log => render_log(f, &session, chunks[1]),
        View::Help => render_help(f, chunks[1]),
    }
    render_detail(f, app, &session, chunks[2]);
    drop(session);

    render_status_bar(f, app, chunks[3]);
}

fn render_header(f: &mut Frame, app: &App, session: &Session, area: Rect) {
    let tree = session.tree();
    let counters = tree.counters();
    let mut spans = vec![
        Span::styled(" ayu ", Style::default().bg(Color::Blue).fg(Color::White)),
        Span::raw(format!(" {} ", app.endpoint)),
        Span::styled(
            format!(" {} tests ", tree.total_leaves()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    for (count, status) in [
        (counters.passed, Status::Passed),
        (counters.failed, Status::Failed),
        (counters.error, Status::Error),
        (counters.skipped, Status::Skipped),
        (counters.xfailed, Status::Xfailed),
        (counters.xpassed, Status::Xpassed),
        (counters.queued, Status::Queued),
    ] {
        if count > 0 {
            spans.push(Span::styled(format!(" {count} {status} "), status_style(status)));
        }
    }
    if tree.marked_leaves() > 0 {
        spans.push(Span::styled(
            format!(" {} marked ", tree.marked_leaves()),
            Style::default().fg(Color::Yellow),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_tree(f: &mut Frame, app: &App, session: &Session, area: Rect) {
    let tree = session.tree();
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .filter_map(|row| tree.node(row.id).map(|node| (row, node)))
        .map(|(row, node)| {
            let mark = if node.favourite { "* " } else { "  " };
            let mut spans = vec![
                Span::styled(mark, Style::default().fg(Color::Yellow)),
                Span::raw("  ".repeat(row.depth)),
                Span::styled(format!("{} ", type_glyph(node.node_type)), Style::default().fg(Color::DarkGray)),
                Span::raw(node.name.clone()),
            ];
            if node.is_leaf() && node.status != Status::Empty {
                spans.push(Span::raw(" "));
                spans.push(Span::styled(node.status.to_string(), status_style(node.status)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    if tree.is_empty() {
        let waiting = Paragraph::new("waiting for a collection... (r to collect)")
            .block(Block::default().borders(Borders::ALL).title(" Tests "));
        f.render_widget(waiting, area);
        return;
    }

    let title = format!(" Tests{} ", filter_label(&app.filter));
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn render_coverage(f: &mut Frame, session: &Session, area: Rect) {
    let coverage = session.coverage();
    if coverage.is_empty() {
        let empty = Paragraph::new("no coverage data yet (enable pytest-cov in [runner] plugins)")
            .block(Block::default().borders(Borders::ALL).title(" Coverage "));
        f.render_widget(empty, area);
        return;
    }

    let header_cells = ["File", "Stmts", "Miss", "Cover", "Missing"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow)));
    let header = Row::new(header_cells).height(1);

    let rows = coverage.iter().map(|(path, record)| {
        let missing = record
            .missing_line_ranges
            .iter()
            .map(|range| range.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Row::new(vec![
            Cell::from(path.to_string()),
            Cell::from(record.statements_total.to_string()),
            Cell::from(record.statements_missed.to_string()),
            Cell::from(format!("{:.0}%", record.percent_covered))
                .style(Style::default().fg(coverage_color(record.percent_covered))),
            Cell::from(truncate(&missing, 60)),
        ])
    });

    let summary = coverage.summary();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(
                " Coverage {:.1}% of {} statements ",
                summary.percent_covered, summary.statements_total
            )),
    );
    f.render_widget(table, area);
}

fn render_log(f: &mut Frame, session: &Session, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let entries: Vec<_> = session.log().rev().take(visible).collect();
    let lines: Vec<Line> = entries
        .into_iter()
        .rev()
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{:<10} ", entry.kind.as_str()), Style::default().fg(kind_color(entry.kind))),
                Span::raw(entry.message.clone()),
            ])
        })
        .collect();

    let log = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Log "));
    f.render_widget(log, area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let section = |title: &'static str| {
        Line::from(vec![Span::styled(
            title,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )])
    };
    let text = vec![
        Line::from(""),
        section("  Navigation"),
        Line::from("    j/Down    Move down"),
        Line::from("    k/Up      Move up"),
        Line::from("    /         Search (prefix :CLASS, :FUNCTION, ... to filter by type)"),
        Line::from("    n         Next search match"),
        Line::from("    Esc/q     Back / Quit"),
        Line::from(""),
        section("  Tests"),
        Line::from("    Space/m   Mark or unmark the selected node"),
        Line::from("    Enter     Run marked tests (all when none are marked)"),
        Line::from("    r         Re-collect the suite"),
        Line::from("    1-4       Toggle marked / passed / failed / skipped"),
        Line::from(""),
        section("  Views"),
        Line::from("    c         Coverage"),
        Line::from("    l         Event log"),
        Line::from("    ?         Show this help"),
        Line::from(""),
    ];

    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title(" Help "));
    f.render_widget(help, area);
}

fn render_detail(f: &mut Frame, app: &App, session: &Session, area: Rect) {
    let Some(node) = app.selected_id().and_then(|id| session.tree().node(id)) else {
        return;
    };
    let mut spans = vec![
        Span::styled(format!(" {} ", node.node_type), Style::default().fg(Color::Cyan)),
        Span::raw(node.nodeid.clone().unwrap_or_else(|| node.name.clone())),
    ];
    if let Some(path) = &node.path {
        let location = match node.lineno {
            Some(line) => format!("  {path}:{line}"),
            None => format!("  {path}"),
        };
        spans.push(Span::styled(location, Style::default().fg(Color::DarkGray)));
    }
    if !node.markers.is_empty() {
        spans.push(Span::styled(
            format!("  @{}", node.markers.join(" @")),
            Style::default().fg(Color::Magenta),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    if let Some(search) = &app.search {
        let prompt = Line::from(vec![
            Span::styled(" / ", Style::default().bg(Color::Blue).fg(Color::White)),
            Span::raw(format!(" {}", search.query)),
        ]);
        f.render_widget(Paragraph::new(prompt), area);
        return;
    }

    let view_name = match app.current_view {
        View::Tree => "Tests",
        View::Coverage => "Coverage",
        View::Log => "Log",
        View::Help => "Help",
    };

    let run = match &app.active_run {
        Some(run) => Span::styled(format!("{} running", run.label), Style::default().fg(Color::Cyan)),
        None => Span::styled("idle", Style::default().fg(Color::DarkGray)),
    };

    let status_msg = app.status_message.as_deref().unwrap_or("");

    let bar = Line::from(vec![
        Span::styled(
            format!(" {view_name} "),
            Style::default().bg(Color::Blue).fg(Color::White),
        ),
        Span::raw("  "),
        run,
        Span::raw("  "),
        Span::styled(status_msg, Style::default().fg(Color::Green)),
        Span::raw("  q:quit  ?:help  enter:run"),
    ]);

    f.render_widget(Paragraph::new(bar), area);
}

// -- Helpers --

fn status_style(status: Status) -> Style {
    let color = match status {
        Status::Empty => Color::DarkGray,
        Status::Queued => Color::Cyan,
        Status::Passed => Color::Green,
        Status::Failed | Status::Error => Color::Red,
        Status::Skipped | Status::Xfailed => Color::Yellow,
        Status::Xpassed => Color::Magenta,
    };
    Style::default().fg(color)
}

fn kind_color(kind: EventKind) -> Color {
    match kind {
        EventKind::Collection => Color::Blue,
        EventKind::Scheduled => Color::Cyan,
        EventKind::Outcome => Color::Green,
        EventKind::Report => Color::Yellow,
        EventKind::Coverage => Color::Magenta,
        EventKind::Debug => Color::DarkGray,
    }
}

fn coverage_color(percent: f64) -> Color {
    if percent >= 90.0 {
        Color::Green
    } else if percent >= 60.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn type_glyph(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Dir => "D",
        NodeType::Module => "M",
        NodeType::Class => "C",
        NodeType::Function => "f",
        NodeType::Coroutine => "a",
    }
}

/// Suffix naming the hidden categories, e.g. ` (hiding passed, skipped)`.
fn filter_label(filter: &TreeFilter) -> String {
    if filter.is_default() {
        return String::new();
    }
    let hidden: Vec<&str> = [
        (filter.marked, "marked"),
        (filter.passed, "passed"),
        (filter.failed, "failed"),
        (filter.skipped, "skipped"),
    ]
    .into_iter()
    .filter(|(shown, _)| !shown)
    .map(|(_, name)| name)
    .collect();
    format!(" (hiding {})", hidden.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}
