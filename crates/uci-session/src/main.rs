//! Interactive analysis session
//!
//! Reads commands from stdin, keeps the game in a `GameState` and streams
//! engine evaluations to stdout as JSON lines. Logs go to stderr.

use std::fmt::Display;

use chess_core::{GameState, MoveProgress, MoveRequest};
use serde_json::{json, Value};
use shakmaty::{Color, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use uci_session::{
    Engine, EngineHost, EngineSession, InProcessTransport, MaterialBackend, Protocol, Search,
    SearchEvent, SessionConfig, StockfishTransport,
};

const HELP: &str = "commands: move <uci> | promote <q|r|b|n> | cancel | back | forward | start | end | \
                    fen <fen> | load <pgn> | pgn | trim | flip | analyze | stop | show | quit";

struct Session {
    state: GameState,
    host: EngineHost,
    config: SessionConfig,
    events: mpsc::UnboundedSender<SearchEvent>,
    analyzing: bool,
}

impl Session {
    /// Handle one command line; `false` ends the session.
    fn command(&mut self, line: &str) -> bool {
        let (cmd, arg) = line
            .trim()
            .split_once(' ')
            .map(|(c, a)| (c, a.trim()))
            .unwrap_or((line.trim(), ""));

        let changed = match cmd {
            "" => false,
            "quit" | "exit" => return false,
            "help" => {
                emit(json!({ "event": "help", "message": HELP }));
                false
            }
            "move" => self.play(arg),
            "promote" => self.promote(arg),
            "cancel" => self.state.promotion_canceled(),
            "back" => self.navigate(GameState::view_previous),
            "forward" => self.navigate(GameState::view_next),
            "start" => self.navigate(GameState::view_start),
            "end" => self.navigate(GameState::view_current),
            "fen" => report(self.state.set_position(arg)),
            "load" => report(self.state.load_pgn(arg)),
            "trim" => report(self.state.trim_moves().map(|n| info!(removed = n, "trimmed"))),
            "flip" => {
                self.state.toggle_orientation();
                true
            }
            "pgn" => {
                emit(json!({ "event": "pgn", "pgn": self.state.current().pgn }));
                false
            }
            "show" => true,
            "analyze" => {
                self.analyzing = true;
                self.analyze();
                false
            }
            "stop" => {
                self.analyzing = false;
                self.host.stop();
                false
            }
            other => fail(format!("unknown command: {other}")),
        };

        if changed {
            emit(snapshot(&self.state));
            if self.analyzing {
                self.analyze();
            }
        }
        true
    }

    fn play(&mut self, arg: &str) -> bool {
        let request: MoveRequest = match arg.parse() {
            Ok(r) => r,
            Err(e) => return fail(e),
        };
        match self.state.play(request) {
            Ok(MoveProgress::Committed(_)) => true,
            Ok(MoveProgress::AwaitingPromotion(ticket)) => {
                emit(json!({
                    "event": "promotion",
                    "id": ticket.id(),
                    "message": "promote <q|r|b|n> or cancel",
                }));
                false
            }
            Err(e) => fail(e),
        }
    }

    fn promote(&mut self, arg: &str) -> bool {
        let Some(role) = promotion_role(arg) else {
            return fail("expected one of q, r, b, n");
        };
        match self.state.promotion_selected(role) {
            Some(outcome) => report(outcome.map(|_| ())),
            None => fail("no promotion pending"),
        }
    }

    fn navigate(&mut self, step: fn(&mut GameState)) -> bool {
        let before = self.state.viewing().ply;
        step(&mut self.state);
        self.state.viewing().ply != before
    }

    fn analyze(&mut self) {
        let search = Search::with_events(
            self.state.analysis_position(),
            self.config.search_ms,
            self.events.clone(),
        );
        self.host.start(search);
    }
}

fn promotion_role(arg: &str) -> Option<Role> {
    match arg.to_ascii_lowercase().as_str() {
        "q" | "queen" => Some(Role::Queen),
        "r" | "rook" => Some(Role::Rook),
        "b" | "bishop" => Some(Role::Bishop),
        "n" | "knight" => Some(Role::Knight),
        _ => None,
    }
}

/// Emit an error line; the projection didn't change.
fn fail(e: impl Display) -> bool {
    emit(json!({ "event": "error", "message": e.to_string() }));
    false
}

fn report<E: Display>(result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => fail(e),
    }
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

fn snapshot(state: &GameState) -> Value {
    let viewing = state.viewing();
    let current = state.current();
    json!({
        "event": "state",
        "fen": viewing.fen,
        "ply": viewing.ply,
        "live_ply": current.ply,
        "turn": color_name(viewing.turn_color),
        "check": viewing.check.map(|s| s.to_string()),
        "orientation": color_name(viewing.orientation),
        "material": viewing.material.advantage(),
        "pgn": current.pgn,
        "result": current.game_result.map(|r| r.to_string()),
    })
}

fn emit(value: Value) {
    println!("{value}");
}

fn eval_line(event: SearchEvent) -> Result<Value, serde_json::Error> {
    let (is_final, eval) = match event {
        SearchEvent::CurrentMove(eval) => (false, eval),
        SearchEvent::BestMove(eval) => (true, eval),
    };
    let mut value = serde_json::to_value(&eval)?;
    if let Value::Object(map) = &mut value {
        map.insert("event".into(), json!("eval"));
        map.insert("final".into(), json!(is_final));
    }
    Ok(value)
}

fn engine_for(config: &SessionConfig) -> Box<dyn Engine> {
    let protocol = Protocol::with_options(config.engine_options.clone());
    if config.is_builtin() {
        Box::new(EngineSession::with_protocol(
            InProcessTransport::new(MaterialBackend::new),
            protocol,
        ))
    } else {
        Box::new(EngineSession::with_protocol(
            StockfishTransport::new(config.engine_path.clone()),
            protocol,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = SessionConfig::load()?;
    let (events, mut evals) = mpsc::unbounded_channel();

    let mut state = GameState::new();
    state.set_player_color(config.player_color);

    let mut host = EngineHost::new();
    host.swap(Some(engine_for(&config)));

    let mut session = Session {
        state,
        host,
        config,
        events,
        analyzing: false,
    };

    info!("Session ready");
    emit(snapshot(&session.state));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                match line? {
                    Some(line) => {
                        if !session.command(&line) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(event) = evals.recv() => {
                match eval_line(event) {
                    Ok(value) => emit(value),
                    Err(e) => warn!(error = %e, "failed to encode evaluation"),
                }
            }
        }
    }

    info!("Shutting down engine");
    session.host.swap(None);
    Ok(())
}
