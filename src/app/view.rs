//! Drawing. Reads [`State`], never changes it.

use super::focus::Selectable;
use super::palette::Group;
use super::reader::OpenBook;
use super::state::{AuthMode, Overlay, Screen, State};
use super::theme::{Theme, vertical_margin};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};

const HELP: &[(&str, &str)] = &[
    ("Ctrl+P", "command palette"),
    ("Ctrl+H", "this help"),
    ("Ctrl+C", "quit"),
    ("Tab / Shift+Tab", "move focus"),
    ("Enter", "activate"),
    ("Esc", "back"),
    ("a", "add book (library)"),
    ("Ctrl+F", "search (library)"),
    ("Ctrl+R", "refresh (library, community)"),
    ("Up / Down", "scroll (reader)"),
    ("h / l", "previous / next page (reader)"),
    ("g / G", "start / end (reader)"),
    ("z", "toggle zen mode (reader)"),
    ("b", "bookmark (reader)"),
];

pub fn render(frame: &mut Frame, state: &State) {
    let theme = state.theme();
    let area = frame.area();
    frame.render_widget(Block::default().style(theme.base()), area);

    if state.splash.is_some() {
        render_splash(frame, area, state, &theme);
        return;
    }

    if state.is_zen()
        && let Some(book) = &state.reader
    {
        render_text(frame, area, state, book, &theme);
    } else {
        let [header, body, footer] =
            Layout::vertical([Constraint::Length(1), Constraint::Min(1), Constraint::Length(2)]).areas(area);
        render_header(frame, header, state, &theme);
        match state.screen {
            Screen::Auth => render_auth(frame, body, state, &theme),
            Screen::Library => render_library(frame, body, state, &theme),
            Screen::Reader => render_reader(frame, body, state, &theme),
            Screen::Community => render_community(frame, body, state, &theme),
            Screen::Settings => render_list(frame, body, state, &theme, "Settings"),
        }
        render_footer(frame, footer, state, &theme);
    }

    match state.overlay() {
        Overlay::None => {},
        Overlay::Help => render_help(frame, area, &theme),
        Overlay::Palette => render_palette(frame, area, state, &theme),
        Overlay::Loading => render_loading(frame, area, state, &theme),
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn popup<'a>(title: &'a str, theme: &Theme) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(theme.accent())
        .style(theme.base())
}

// =============================================================================
// Chrome
// =============================================================================

fn render_header(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let mut spans = vec![Span::styled(" libra-link ", theme.highlight()), Span::raw(" ")];
    for (screen, label) in [
        (Screen::Library, "Library"),
        (Screen::Reader, "Reader"),
        (Screen::Community, "Community"),
        (Screen::Settings, "Settings"),
    ] {
        let style = if state.screen == screen { theme.accent().add_modifier(Modifier::BOLD) } else { theme.muted() };
        spans.push(Span::styled(format!(" {label} "), style));
    }
    let who = match (&state.user, state.user_id) {
        (Some(user), _) => format!("  {}", user.username),
        (None, Some(_)) => "  offline".to_string(),
        (None, None) => "  signed out".to_string(),
    };
    spans.push(Span::styled(who, theme.muted()));
    frame.render_widget(Paragraph::new(Line::from(spans)).style(theme.base()), area);
}

fn render_footer(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let [status, hints] = Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(area);
    let mut spans = vec![Span::styled(format!(" {}", state.status), theme.accent())];
    if let Some(error) = &state.error {
        spans.push(Span::styled(
            format!("  {error}"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), status);
    let hint = format!(" {}  ·  Ctrl+P palette  ·  Ctrl+H help  ·  Ctrl+C quit", state.sync);
    frame.render_widget(Paragraph::new(hint).style(theme.muted()), hints);
}

fn render_splash(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let box_area = centered(area, 36, 7);
    frame.render_widget(Clear, box_area);
    let lines = vec![
        Line::raw(""),
        Line::styled("libra-link", theme.accent().add_modifier(Modifier::BOLD)).centered(),
        Line::raw("your library, offline first").centered(),
        Line::raw(""),
        Line::raw(format!("{} starting…", state.loading.spinner())).centered(),
    ];
    frame.render_widget(Paragraph::new(lines).block(popup("", theme)), box_area);
}

// =============================================================================
// Screens
// =============================================================================

/// One row per focusable element, inputs showing their current value.
fn item_text(state: &State, item: &Selectable) -> String {
    let Some(field) = state.field(&item.id) else {
        return match item.id.strip_prefix("book:") {
            Some(id) => book_row(state, id).unwrap_or_else(|| item.label.clone()),
            None => item.label.clone(),
        };
    };
    let value = if field.secret { "•".repeat(field.value.chars().count()) } else { field.value.clone() };
    let cursor = if state.focus.is_focused(&item.id) { "▏" } else { "" };
    format!("{}: {value}{cursor}", field.label)
}

fn book_row(state: &State, id: &str) -> Option<String> {
    let ebook = state.library.ebooks.iter().find(|ebook| ebook.id.to_string() == id)?;
    let author = ebook.author.as_deref().unwrap_or("unknown author");
    Some(format!("{}  ·  {author}  ·  {}", ebook.title, ebook.format.to_uppercase()))
}

fn render_list(frame: &mut Frame, area: Rect, state: &State, theme: &Theme, title: &str) {
    let items: Vec<ListItem> = state
        .focus
        .items()
        .iter()
        .map(|item| {
            let style = if item.disabled { theme.muted() } else { theme.base() };
            ListItem::new(item_text(state, item)).style(style)
        })
        .collect();
    let selected = state
        .focus
        .focused_id()
        .and_then(|id| state.focus.items().iter().position(|item| item.id == id));
    let list = List::new(items)
        .block(Block::default().title(title).borders(Borders::ALL).border_style(theme.muted()))
        .style(theme.base())
        .highlight_style(theme.highlight())
        .highlight_symbol("› ");
    let mut list_state = ListState::default().with_selected(selected);
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn render_auth(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let title = match state.auth.mode {
        AuthMode::Login => "Log in",
        AuthMode::Register => "Register",
        AuthMode::Device => "Google device sign-in",
    };
    let Some(device) = &state.auth.device else {
        render_list(frame, area, state, theme, title);
        return;
    };
    let [list, info] = Layout::vertical([Constraint::Min(3), Constraint::Length(5)]).areas(area);
    render_list(frame, list, state, theme, title);
    let lines = vec![
        Line::from(vec![Span::raw("Visit "), Span::styled(device.auth_url.as_str(), theme.accent())]),
        Line::from(vec![
            Span::raw("Code "),
            Span::styled(device.device_code.as_str(), theme.accent().add_modifier(Modifier::BOLD)),
        ]),
        Line::styled(format!("{} waiting for approval until {}", state.loading.spinner(), device.expires_at), theme.muted()),
    ];
    frame.render_widget(Paragraph::new(lines).block(popup("Device", theme)), info);
}

fn render_library(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    match &state.library.add {
        Some(add) => match &add.duplicate {
            Some(duplicate) => {
                let [info, list] = Layout::vertical([Constraint::Length(4), Constraint::Min(3)]).areas(area);
                let place = match (&duplicate.local_path, &duplicate.remote) {
                    (_, Some(remote)) => format!("on the server as \"{}\"", remote.title),
                    (Some(path), None) => format!("at {}", path.display()),
                    (None, None) => "already".to_string(),
                };
                let text = format!("This file is in your library {place}. Import it anyway?");
                frame.render_widget(
                    Paragraph::new(text).wrap(Wrap { trim: true }).block(popup("Duplicate", theme)),
                    info,
                );
                render_list(frame, list, state, theme, "Add book");
            },
            None => render_list(frame, area, state, theme, "Add book"),
        },
        None => {
            let shown = state.library.visible().len();
            let title = format!("Library ({shown} of {})", state.library.ebooks.iter().filter(|e| !e.is_deleted()).count());
            render_list(frame, area, state, theme, &title);
        },
    }
}

fn render_community(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let [list, detail] = Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(area);
    render_list(frame, list, state, theme, "Community");
    let lines = match state.community.target() {
        Some(share) => {
            let mut lines = vec![
                Line::styled(share.title.as_str(), theme.accent().add_modifier(Modifier::BOLD)),
                Line::raw(share.author.as_deref().unwrap_or("unknown author")),
            ];
            if let Some(status) = &share.status {
                lines.push(Line::styled(format!("status: {status}"), theme.muted()));
            }
            if let Some(description) = &share.description {
                lines.push(Line::raw(""));
                lines.push(Line::raw(description.as_str()));
            }
            lines
        },
        None => vec![Line::styled("no shares cached yet", theme.muted())],
    };
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: true }).block(popup("Share", theme)),
        detail,
    );
}

fn render_reader(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let Some(book) = &state.reader else {
        frame.render_widget(Paragraph::new("No book open.").style(theme.muted()), area);
        return;
    };
    let [text, status] = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(area);
    render_text(frame, text, state, book, theme);
    let total = book.document.lines().len();
    let line = format!(
        " {}  ·  line {}/{}  ·  {:.1}%  ·  {}",
        book.ebook.title,
        (book.top + 1).min(total.max(1)),
        total,
        book.percent(),
        book.location()
    );
    frame.render_widget(Paragraph::new(line).style(Style::default().fg(theme.progress).bg(theme.background)), status);
}

fn render_text(frame: &mut Frame, area: Rect, state: &State, book: &OpenBook, theme: &Theme) {
    let inner = area.inner(Margin::new(
        state.ui.gutter_preset.columns(),
        vertical_margin(state.preferences.typography_profile),
    ));
    let lines: Vec<Line> = book.visible(usize::from(inner.height)).iter().map(|line| Line::raw(line.as_str())).collect();
    frame.render_widget(Paragraph::new(lines).style(theme.base()), inner);
}

// =============================================================================
// Overlays
// =============================================================================

fn render_help(frame: &mut Frame, area: Rect, theme: &Theme) {
    let height = u16::try_from(HELP.len()).unwrap_or(u16::MAX).saturating_add(4);
    let box_area = centered(area, 56, height);
    frame.render_widget(Clear, box_area);
    let mut lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![Span::styled(format!("{keys:>18}  "), theme.accent()), Span::raw(*action)])
        })
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::styled("Esc or Enter to close", theme.muted()).centered());
    frame.render_widget(Paragraph::new(lines).block(popup("Help", theme)), box_area);
}

fn render_palette(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let box_area = centered(area, 64, area.height.saturating_sub(4).max(8));
    frame.render_widget(Clear, box_area);
    let block = popup("Command palette", theme);
    let inner = block.inner(box_area);
    frame.render_widget(block, box_area);
    let [query, entries] = Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(inner);
    frame.render_widget(
        Paragraph::new(format!("> {}▏", state.palette.query)).style(theme.accent()),
        query,
    );
    let items: Vec<ListItem> = state
        .palette
        .entries
        .iter()
        .map(|entry| {
            let tag = match entry.group {
                Group::Commands => "cmd ",
                Group::Books => "book",
            };
            let mut text = format!("{tag}  {}", entry.title);
            if !entry.enabled {
                text.push_str("  (unavailable)");
            }
            let style = if entry.enabled { theme.base() } else { theme.muted() };
            ListItem::new(text).style(style)
        })
        .collect();
    let selected = state
        .focus
        .focused_id()
        .and_then(|id| state.palette.entries.iter().position(|entry| entry.id == id));
    let list = List::new(items).highlight_style(theme.highlight()).highlight_symbol("› ");
    let mut list_state = ListState::default().with_selected(selected);
    frame.render_stateful_widget(list, entries, &mut list_state);
}

fn render_loading(frame: &mut Frame, area: Rect, state: &State, theme: &Theme) {
    let box_area = centered(area, 40, 3);
    frame.render_widget(Clear, box_area);
    let text = format!("{} {}", state.loading.spinner(), state.loading.message());
    frame.render_widget(Paragraph::new(text).centered().block(popup("", theme)), box_area);
}
