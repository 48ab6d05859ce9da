//! Selection switching, stale event handling and reconnect scheduling

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use xcandle::config::Config;
use xcandle::market_data::{
    Candle, CandleUpdate, Generation, Instrument, Interval, MarketEvent, MarketFeed,
    RECONNECT_DELAY_MS, ReconnectPolicy, StreamHandle, WindowKey,
};
use xcandle::session::{ActionChannel, InteractiveCommand, SessionEvent, SessionManager};
use xcandle::ui::RenderEvent;

/// Feed that records requests and never touches the network
#[derive(Default, Clone)]
struct RecordingFeed {
    backfills: Arc<Mutex<Vec<WindowKey>>>,
    streams: Arc<Mutex<Vec<(WindowKey, Generation)>>>,
}

impl RecordingFeed {
    fn backfills(&self) -> Vec<WindowKey> {
        self.backfills.lock().unwrap().clone()
    }

    fn streams(&self) -> Vec<(WindowKey, Generation)> {
        self.streams.lock().unwrap().clone()
    }
}

impl MarketFeed for RecordingFeed {
    fn spawn_backfill(&self, key: WindowKey, _events: ActionChannel) {
        self.backfills.lock().unwrap().push(key);
    }

    fn open_stream(
        &self,
        key: WindowKey,
        generation: Generation,
        _events: ActionChannel,
    ) -> StreamHandle {
        self.streams.lock().unwrap().push((key, generation));
        StreamHandle::detached(key, generation)
    }
}

fn eth() -> WindowKey {
    WindowKey::new(Instrument::EthUsdt, Interval::OneMinute)
}

fn bnb() -> WindowKey {
    WindowKey::new(Instrument::BnbUsdt, Interval::OneMinute)
}

fn update(key: WindowKey, generation: Generation, timestamp: i64, close: f64) -> MarketEvent {
    MarketEvent::KlineUpdate {
        key,
        generation,
        update: CandleUpdate::new(timestamp, close, close, close, close),
    }
}

fn session_with_renderer() -> (
    SessionManager<RecordingFeed>,
    RecordingFeed,
    mpsc::UnboundedReceiver<RenderEvent>,
) {
    let feed = RecordingFeed::default();
    let (render_tx, render_rx) = mpsc::unbounded_channel();
    let session = SessionManager::new(Config::default(), feed.clone())
        .with_render_sender(render_tx)
        .with_reconnect_policy(ReconnectPolicy::fixed(Duration::from_millis(20)));
    (session, feed, render_rx)
}

fn drain_renders(rx: &mut mpsc::UnboundedReceiver<RenderEvent>) -> Vec<RenderEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn post(session: &SessionManager<RecordingFeed>, event: MarketEvent) {
    session.action_channel().send_market_event(event).unwrap();
}

#[tokio::test]
async fn test_select_backfills_and_opens_stream_with_new_generation() {
    let (mut session, feed, mut render_rx) = session_with_renderer();

    session.start(eth());
    assert!(session.select(bnb()));

    assert_eq!(feed.backfills(), vec![eth(), bnb()]);
    assert_eq!(feed.streams(), vec![(eth(), 1), (bnb(), 2)]);
    assert_eq!(session.selection().key(), Some(bnb()));

    let renders = drain_renders(&mut render_rx);
    assert!(renders.iter().any(
        |e| matches!(e, RenderEvent::SelectionChanged { key } if *key == bnb())
    ));
}

#[tokio::test]
async fn test_selecting_active_key_is_noop() {
    let (mut session, feed, _render_rx) = session_with_renderer();

    session.start(eth());
    session
        .handle_event(SessionEvent::UserCommand {
            command: InteractiveCommand::Select { key: eth() },
        })
        .unwrap();

    assert_eq!(session.selection().generation(), 1);
    assert_eq!(feed.backfills().len(), 1);
    assert_eq!(feed.streams().len(), 1);
}

#[tokio::test]
async fn test_messages_from_previous_selection_are_ignored() {
    let (mut session, _feed, _render_rx) = session_with_renderer();

    session.start(eth());
    post(&session, update(eth(), 1, 60_000, 1.0));
    session.drain_pending().unwrap();
    assert_eq!(session.window(&eth()).len(), 1);

    session.select(bnb());

    // Still in flight from the closed ETH transport
    post(&session, update(eth(), 1, 120_000, 2.0));
    post(&session, update(eth(), 1, 60_000, 3.0));
    session.drain_pending().unwrap();

    assert_eq!(session.window(&eth()), vec![Candle::new(60_000, 1.0, 1.0, 1.0, 1.0)]);
    assert!(session.window(&bnb()).is_empty());
    assert_eq!(session.metrics().counters().stale_dropped, 2);
}

#[tokio::test]
async fn test_current_updates_merge_and_notify() {
    let (mut session, _feed, mut render_rx) = session_with_renderer();

    session.start(eth());
    drain_renders(&mut render_rx);

    post(&session, update(eth(), 1, 60_000, 1.0));
    post(&session, update(eth(), 1, 60_000, 2.0));
    session.drain_pending().unwrap();

    assert_eq!(session.active_window().len(), 1);
    assert_eq!(session.active_window()[0].high, 2.0);

    let changes = drain_renders(&mut render_rx)
        .into_iter()
        .filter(|e| matches!(e, RenderEvent::WindowChanged { .. }))
        .count();
    assert_eq!(changes, 2);
}

#[tokio::test]
async fn test_malformed_message_changes_nothing() {
    let (mut session, _feed, _render_rx) = session_with_renderer();

    session.start(eth());
    post(
        &session,
        MarketEvent::MalformedMessage {
            key: eth(),
            generation: 1,
            error: "Invalid kline open price: abc".to_string(),
        },
    );
    session.drain_pending().unwrap();

    assert!(session.active_window().is_empty());
    assert_eq!(session.metrics().counters().malformed_dropped, 1);
}

#[tokio::test]
async fn test_backfill_notifies_only_for_active_key() {
    let (mut session, _feed, mut render_rx) = session_with_renderer();

    session.start(eth());
    session.select(bnb());
    drain_renders(&mut render_rx);

    // ETH history lands after the switch
    post(
        &session,
        MarketEvent::BackfillLoaded {
            key: eth(),
            candles: vec![Candle::new(60_000, 1.0, 2.0, 0.5, 1.5)],
        },
    );
    session.drain_pending().unwrap();

    assert_eq!(session.window(&eth()).len(), 1);
    assert!(drain_renders(&mut render_rx).is_empty());

    post(
        &session,
        MarketEvent::BackfillLoaded {
            key: bnb(),
            candles: vec![Candle::new(60_000, 3.0, 4.0, 2.5, 3.5)],
        },
    );
    session.drain_pending().unwrap();

    let renders = drain_renders(&mut render_rx);
    assert!(matches!(
        renders.as_slice(),
        [RenderEvent::WindowChanged { key, candles }] if *key == bnb() && candles.len() == 1
    ));
}

#[tokio::test]
async fn test_late_backfill_overwrites_live_updates() {
    let (mut session, _feed, _render_rx) = session_with_renderer();

    session.start(eth());
    for i in 0..5 {
        post(&session, update(eth(), 1, i * 60_000, 1.0));
    }
    let history = vec![
        Candle::new(0, 9.0, 9.0, 9.0, 9.0),
        Candle::new(60_000, 8.0, 8.0, 8.0, 8.0),
    ];
    post(
        &session,
        MarketEvent::BackfillLoaded {
            key: eth(),
            candles: history.clone(),
        },
    );
    session.drain_pending().unwrap();

    assert_eq!(session.active_window(), history);
}

#[tokio::test]
async fn test_backfill_failure_leaves_window_unchanged() {
    let (mut session, _feed, mut render_rx) = session_with_renderer();

    session.start(eth());
    post(&session, update(eth(), 1, 60_000, 1.0));
    post(
        &session,
        MarketEvent::BackfillFailed {
            key: eth(),
            error: "Network error: timed out".to_string(),
        },
    );
    session.drain_pending().unwrap();

    assert_eq!(session.active_window().len(), 1);
    assert!(
        drain_renders(&mut render_rx)
            .iter()
            .any(|e| matches!(e, RenderEvent::Error { .. }))
    );
}

#[tokio::test]
async fn test_disconnect_of_current_stream_reconnects_same_key() {
    let (mut session, feed, _render_rx) = session_with_renderer();

    session.start(eth());
    post(
        &session,
        MarketEvent::StreamDisconnected {
            key: eth(),
            generation: 1,
            reason: "connection reset".to_string(),
        },
    );
    session.drain_pending().unwrap();
    assert_eq!(feed.streams().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.drain_pending().unwrap();

    assert_eq!(feed.streams(), vec![(eth(), 1), (eth(), 1)]);
    assert_eq!(feed.backfills().len(), 1);
    assert_eq!(session.metrics().counters().reconnects, 1);
}

#[tokio::test]
async fn test_disconnect_of_stale_stream_is_ignored() {
    let (mut session, feed, _render_rx) = session_with_renderer();

    session.start(eth());
    session.select(bnb());
    post(
        &session,
        MarketEvent::StreamDisconnected {
            key: eth(),
            generation: 1,
            reason: "closed".to_string(),
        },
    );
    session.drain_pending().unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.drain_pending().unwrap();

    assert_eq!(feed.streams(), vec![(eth(), 1), (bnb(), 2)]);
    assert_eq!(session.metrics().counters().reconnects, 0);
}

#[tokio::test]
async fn test_reconnect_timer_from_previous_selection_is_ignored() {
    let (mut session, feed, _render_rx) = session_with_renderer();

    session.start(eth());
    post(
        &session,
        MarketEvent::StreamDisconnected {
            key: eth(),
            generation: 1,
            reason: "closed".to_string(),
        },
    );
    session.drain_pending().unwrap();

    // Switch away before the timer fires
    session.select(bnb());
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.drain_pending().unwrap();

    assert_eq!(feed.streams(), vec![(eth(), 1), (bnb(), 2)]);
}

#[tokio::test]
async fn test_default_reconnect_waits_fixed_delay() {
    let feed = RecordingFeed::default();
    let mut session = SessionManager::new(Config::default(), feed.clone());

    session.start(eth());
    post(
        &session,
        MarketEvent::StreamDisconnected {
            key: eth(),
            generation: 1,
            reason: "closed".to_string(),
        },
    );
    session.drain_pending().unwrap();

    tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS / 2)).await;
    session.drain_pending().unwrap();
    assert_eq!(feed.streams().len(), 1);

    tokio::time::sleep(Duration::from_millis(RECONNECT_DELAY_MS)).await;
    session.drain_pending().unwrap();
    assert_eq!(feed.streams().len(), 2);
}

#[tokio::test]
async fn test_symbol_command_switches_instrument_only() {
    let (mut session, feed, _render_rx) = session_with_renderer();

    session.start(WindowKey::new(Instrument::EthUsdt, Interval::ThreeMinutes));
    session
        .action_channel()
        .send_command(InteractiveCommand::Symbol {
            instrument: Instrument::DotUsdt,
        })
        .unwrap();
    session.drain_pending().unwrap();

    let dot_3m = WindowKey::new(Instrument::DotUsdt, Interval::ThreeMinutes);
    assert_eq!(session.selection().key(), Some(dot_3m));
    assert_eq!(feed.streams().last(), Some(&(dot_3m, 2)));
}

#[tokio::test]
async fn test_switching_back_shows_retained_window() {
    let (mut session, _feed, mut render_rx) = session_with_renderer();

    session.start(eth());
    post(&session, update(eth(), 1, 60_000, 1.0));
    session.drain_pending().unwrap();
    session.select(bnb());
    drain_renders(&mut render_rx);

    session.select(eth());

    let renders = drain_renders(&mut render_rx);
    assert!(renders.iter().any(|e| matches!(
        e,
        RenderEvent::WindowChanged { key, candles } if *key == eth() && candles.len() == 1
    )));
    assert_eq!(session.selection().generation(), 3);
}

#[tokio::test]
async fn test_run_stops_on_quit() {
    let (mut session, _feed, _render_rx) = session_with_renderer();

    session.start(eth());
    session
        .action_channel()
        .send_command(InteractiveCommand::Quit)
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), session.run())
        .await
        .expect("session did not stop")
        .unwrap();
}
