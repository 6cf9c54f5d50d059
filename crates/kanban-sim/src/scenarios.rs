use crate::cli::Scenario;
use anyhow::{anyhow, Context};
use kanban_core::{AppConfig, KanbanError};
use kanban_domain::{Board, Card, CardPatch, MoveIntent};
use kanban_sync::{BoardSession, InMemoryBackend, KanbanApi, LocalChannel, Operation};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const ENVIRONMENT: &str = "demo";
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub scenario: &'static str,
    pub steps: Vec<String>,
    pub boards: Vec<BoardView>,
    /// Local view matches server order on every board.
    pub converged: bool,
    /// Every board lists positions `0..n`.
    pub dense: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub id: String,
    pub name: String,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: String,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Serialize)]
pub struct ScenarioInfo {
    pub name: &'static str,
    pub description: &'static str,
}

struct Fixture {
    config: AppConfig,
    backend: InMemoryBackend,
    steps: Vec<String>,
}

impl Fixture {
    fn new(config: &AppConfig, latency: Duration) -> Self {
        let channel = Arc::new(LocalChannel::from_config(&config.realtime));
        let backend = InMemoryBackend::new(channel).with_latency(latency);
        for (index, (id, name)) in [("todo", "Todo"), ("doing", "Doing"), ("done", "Done")]
            .into_iter()
            .enumerate()
        {
            backend.seed_board(Board::new(id, ENVIRONMENT, name, index as i32));
        }
        for (index, (id, title)) in [
            ("card-a", "Sketch layout"),
            ("card-b", "Wire up API"),
            ("card-c", "Write docs"),
        ]
        .into_iter()
        .enumerate()
        {
            backend.seed_card(Card::new(id, "todo", title, index as i32));
        }
        backend.seed_card(Card::new("card-d", "doing", "Fix login bug", 0));

        Self {
            config: config.clone(),
            backend,
            steps: Vec::new(),
        }
    }

    async fn session(&self, user: &str) -> anyhow::Result<Arc<BoardSession>> {
        let session = BoardSession::new(
            Arc::new(self.backend.client(user)),
            self.backend.channel(),
            user,
            &self.config,
        );
        let boards = session
            .open_environment(ENVIRONMENT)
            .await
            .with_context(|| format!("{} could not open {}", user, ENVIRONMENT))?;
        for board in boards {
            session.mount_board(&board.id).await?;
        }
        Ok(Arc::new(session))
    }

    fn step(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{}", text);
        self.steps.push(text);
    }

    fn report(self, scenario: Scenario, session: &BoardSession) -> ScenarioReport {
        let boards: Vec<BoardView> = session
            .boards()
            .into_iter()
            .map(|board| BoardView {
                cards: session
                    .cards(&board.id)
                    .into_iter()
                    .map(|card| CardView {
                        id: card.id,
                        title: card.title,
                        position: card.position,
                    })
                    .collect(),
                id: board.id,
                name: board.name,
            })
            .collect();
        let converged = boards.iter().all(|board| {
            let server: Vec<String> = self.backend.cards(&board.id).into_iter().map(|c| c.id).collect();
            let local: Vec<&String> = board.cards.iter().map(|c| &c.id).collect();
            server.iter().eq(local.into_iter())
        });
        let dense = session.store().read(|store| store.is_dense());

        ScenarioReport {
            scenario: scenario.name(),
            steps: self.steps,
            boards,
            converged,
            dense,
        }
    }
}

/// Wait until `done` holds for the session, re-checking on every store change.
async fn settle(
    session: &BoardSession,
    what: &str,
    mut done: impl FnMut(&BoardSession) -> bool,
) -> anyhow::Result<()> {
    let mut changes = session.subscribe();
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        while !done(session) {
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for {}", what))
}

fn ids(cards: &[Card]) -> Vec<String> {
    cards.iter().map(|c| c.id.clone()).collect()
}

pub fn catalogue() -> Vec<ScenarioInfo> {
    use clap::ValueEnum;
    Scenario::value_variants()
        .iter()
        .map(|scenario| ScenarioInfo {
            name: scenario.name(),
            description: scenario.description(),
        })
        .collect()
}

pub async fn run(
    scenario: Scenario,
    config: &AppConfig,
    latency: Duration,
) -> anyhow::Result<ScenarioReport> {
    let fixture = Fixture::new(config, latency);
    tracing::debug!("Running scenario {}", scenario.name());
    match scenario {
        Scenario::Demo => demo(fixture).await,
        Scenario::Rollback => rollback(fixture).await,
        Scenario::ConcurrentEdit => concurrent_edit(fixture).await,
        Scenario::CrossBoard => cross_board(fixture).await,
        Scenario::OverlappingMoves => overlapping_moves(fixture).await,
    }
}

async fn demo(mut fixture: Fixture) -> anyhow::Result<ScenarioReport> {
    let alice = fixture.session("alice").await?;
    let bob = fixture.session("bob").await?;

    alice.start_drag("card-a");
    alice.hover_id(Some("doing"));
    let resolution = alice.release().await?;
    fixture.step(format!("alice drops card-a on doing: {:?}", resolution));

    bob.update_card("card-b", CardPatch::title("Wire up REST API"))
        .await?;
    fixture.step("bob renames card-b");

    let created = alice.create_card("done", "Celebrate").await?;
    fixture.step(format!("alice creates {} in done", created.id));

    settle(&bob, "bob to see the new card", |s| s.find_card(&created.id).is_some()).await?;
    settle(&alice, "alice to see the rename", |s| {
        s.find_card("card-b").is_some_and(|c| c.title == "Wire up REST API")
    })
    .await?;
    settle(&bob, "bob to see the move", |s| {
        ids(&s.cards("doing")) == ["card-d", "card-a"]
    })
    .await?;
    fixture.step("both sessions converged");

    Ok(fixture.report(Scenario::Demo, &alice))
}

async fn rollback(mut fixture: Fixture) -> anyhow::Result<ScenarioReport> {
    let alice = fixture.session("alice").await?;
    fixture
        .backend
        .reject_next(Operation::MoveCard, "board is read-only");

    alice.start_drag("card-c");
    match alice.resolve_drop_id(Some("done")).await {
        Err(err) => fixture.step(format!("move of card-c rejected: {}", err)),
        Ok(resolution) => return Err(anyhow!("expected a rejection, got {:?}", resolution)),
    }
    fixture.step(format!(
        "card-c is back on {}",
        alice.board_of("card-c").unwrap_or_default()
    ));

    Ok(fixture.report(Scenario::Rollback, &alice))
}

async fn concurrent_edit(mut fixture: Fixture) -> anyhow::Result<ScenarioReport> {
    let alice = fixture.session("alice").await?;
    let bob = fixture.backend.client("bob");

    let release = fixture.backend.pause_next(Operation::MoveCard);
    let mover = alice.clone();
    let pending = tokio::spawn(async move {
        mover
            .engine()
            .move_card(MoveIntent {
                card_id: "card-b".into(),
                from_board_id: "todo".into(),
                to_board_id: "doing".into(),
                new_index: 0,
            })
            .await
    });
    settle(&alice, "the optimistic move", |s| {
        s.board_of("card-b").as_deref() == Some("doing")
    })
    .await?;
    fixture.step("alice moves card-b to doing; server response held");

    bob.update_card("card-b", CardPatch::title("Wire up API (v2)"))
        .await?;
    settle(&alice, "the remote rename", |s| {
        s.find_card("card-b").is_some_and(|c| c.title == "Wire up API (v2)")
    })
    .await?;
    fixture.step("bob renames card-b; alice sees it on doing");

    let _ = release.send(());
    let outcome = pending.await??;
    fixture.step(format!("move confirmed: {:?}", outcome));

    Ok(fixture.report(Scenario::ConcurrentEdit, &alice))
}

async fn cross_board(mut fixture: Fixture) -> anyhow::Result<ScenarioReport> {
    let alice = fixture.session("alice").await?;

    alice.start_drag("card-a");
    alice.hover_id(Some("card-d"));
    let resolution = alice.release().await?;
    fixture.step(format!("alice drops card-a onto card-d: {:?}", resolution));

    alice.start_drag("card-c");
    let resolution = alice.resolve_drop_id(Some("card-c")).await?;
    fixture.step(format!("card-c dropped onto itself: {:?}", resolution));

    Ok(fixture.report(Scenario::CrossBoard, &alice))
}

async fn overlapping_moves(mut fixture: Fixture) -> anyhow::Result<ScenarioReport> {
    let alice = fixture.session("alice").await?;
    let backend = fixture.backend.clone();

    let release_first = backend.pause_next(Operation::MoveCard);
    let release_second = backend.pause_next(Operation::MoveCard);
    backend.reject_next(Operation::MoveCard, "conflict");
    backend.reject_next(Operation::MoveCard, "conflict");

    let engine = alice.engine().clone();
    let first = tokio::spawn(async move {
        engine
            .move_card(MoveIntent {
                card_id: "card-a".into(),
                from_board_id: "todo".into(),
                to_board_id: "doing".into(),
                new_index: 0,
            })
            .await
    });
    settle(&alice, "the first move", |s| {
        s.board_of("card-a").as_deref() == Some("doing")
    })
    .await?;

    let engine = alice.engine().clone();
    let second = tokio::spawn(async move {
        engine
            .move_card(MoveIntent {
                card_id: "card-a".into(),
                from_board_id: "doing".into(),
                to_board_id: "done".into(),
                new_index: 0,
            })
            .await
    });
    settle(&alice, "the second move", |s| {
        s.board_of("card-a").as_deref() == Some("done")
    })
    .await?;
    fixture.step("card-a moved todo -> doing -> done, both responses held");

    let _ = release_first.send(());
    let first = first.await?;
    fixture.step(format!(
        "first move failed ({}); card-a stays on {}",
        describe(first.err()),
        alice.board_of("card-a").unwrap_or_default()
    ));

    let _ = release_second.send(());
    let second = second.await?;
    fixture.step(format!(
        "second move failed ({}); card-a back on {}",
        describe(second.err()),
        alice.board_of("card-a").unwrap_or_default()
    ));

    Ok(fixture.report(Scenario::OverlappingMoves, &alice))
}

fn describe(err: Option<KanbanError>) -> String {
    err.map_or_else(|| "no error".to_string(), |err| err.to_string())
}
