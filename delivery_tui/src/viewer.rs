//! Terminal viewer that steps a controller and draws the grid each tick.

use anyhow::Result;
use delivery_core::{
    Position,
    controller::{Controller, ControllerState, DeliveryOutcome},
    terrain::Terrain,
};
use rand::rngs::StdRng;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    io::{self, Stdout},
    time::{Duration, Instant},
};

struct App {
    controller: Controller<StdRng>,
    should_quit: bool,
    paused: bool,
}

impl App {
    fn tick(&mut self) {
        if self.paused || self.controller.is_finished() {
            return;
        }
        self.controller.tick();
    }
}

/// Runs the viewer until the user quits and returns the outcome reached so far.
pub fn watch(controller: Controller<StdRng>, tick_ms: u64) -> Result<DeliveryOutcome> {
    let mut terminal = setup_terminal()?;
    let mut app = App {
        controller,
        should_quit: false,
        paused: false,
    };

    let result = run_app(&mut terminal, &mut app, Duration::from_millis(tick_ms));
    restore_terminal(&mut terminal)?;
    result?;

    Ok(app.controller.outcome())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                    KeyCode::Char(' ') => app.paused = !app.paused,
                    // Single step while paused.
                    KeyCode::Char('n') if app.paused => {
                        if !app.controller.is_finished() {
                            app.controller.tick();
                        }
                    }
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70),
            Constraint::Percentage(20),
            Constraint::Percentage(10),
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.controller);
    render_status(frame, main_layout[1], &app.controller);

    let help = if app.paused {
        "Paused. Space resumes, 'n' steps, 'q' or 'Esc' quits."
    } else {
        "Space pauses, 'q' or 'Esc' quits."
    };
    let help_text = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn state_line(state: ControllerState) -> Span<'static> {
    match state {
        ControllerState::Planning => Span::styled("planning", Style::default().fg(Color::Cyan)),
        ControllerState::Executing => Span::styled("executing", Style::default().fg(Color::Green)),
        ControllerState::Replanning => Span::styled("replanning", Style::default().fg(Color::Yellow)),
        ControllerState::Arrived => Span::styled("arrived", Style::default().fg(Color::Green).bold()),
        ControllerState::Stuck(reason) => {
            Span::styled(format!("stuck: {reason}"), Style::default().fg(Color::Red).bold())
        }
    }
}

fn render_status(frame: &mut Frame, area: Rect, controller: &Controller<StdRng>) {
    let agent = controller.agent();
    let pos = agent.position();
    let items = vec![
        ListItem::from(Line::from(vec![
            Span::raw("State: "),
            state_line(controller.state()),
        ])),
        ListItem::from(format!(
            "Pos: ({}, {})  Fuel: {} (used {})  Cost travelled: {}",
            pos.x,
            pos.y,
            agent.fuel(),
            agent.fuel_used(),
            agent.cost_travelled()
        )),
        ListItem::from(format!(
            "Tick: {}  Steps: {}  Replans: {}",
            controller.ticks(),
            agent.steps(),
            controller.replans()
        )),
        ListItem::from(format!(
            "Picked up: {}  Delivered: {}  Goals remaining: {}",
            agent.picked_up(),
            agent.delivered(),
            agent.goals_remaining()
        )),
    ];

    let status_widget =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Agent"));
    frame.render_widget(status_widget, area);
}

fn terrain_span(terrain: Terrain) -> Span<'static> {
    match terrain {
        Terrain::Road => Span::styled(".", Style::default().fg(Color::DarkGray)),
        Terrain::Grass => Span::styled(",", Style::default().fg(Color::Green)),
        Terrain::Mud => Span::styled("~", Style::default().fg(Color::Rgb(139, 90, 43))),
        Terrain::Water => Span::styled("≈", Style::default().fg(Color::Blue)),
    }
}

fn render_map(frame: &mut Frame, area: Rect, controller: &Controller<StdRng>) {
    let world = controller.world();
    let grid = world.grid();
    let agent = controller.agent();
    let moving = world.tracker().positions();
    let planned: HashSet<Position> = agent.remaining_path().into_iter().collect();
    let pickups: HashSet<Position> = agent.pickups().collect();
    let dropoffs: HashSet<Position> = agent.destinations().collect();

    let mut lines: Vec<Line> = Vec::with_capacity(grid.height());

    for y in 0..grid.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(grid.width());
        for x in 0..grid.width() {
            let cell = Position::new(x, y);
            let span = if cell == agent.position() {
                Span::styled("@", Style::default().fg(Color::Red).bold())
            } else if moving.contains(&cell) {
                Span::styled("o", Style::default().fg(Color::Magenta).bold())
            } else if grid.has_obstacle(cell) {
                Span::styled("#", Style::default().fg(Color::DarkGray))
            } else if pickups.contains(&cell) {
                Span::styled("p", Style::default().fg(Color::Yellow))
            } else if dropoffs.contains(&cell) {
                Span::styled("d", Style::default().fg(Color::Green))
            } else if planned.contains(&cell) {
                Span::styled("*", Style::default().fg(Color::Cyan))
            } else {
                grid.terrain(cell).map(terrain_span).unwrap_or_else(|_| Span::raw(" "))
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = format!(
        "Delivery ({}x{}, {})",
        grid.width(),
        grid.height(),
        grid.connectivity()
    );
    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
