//! Notification dispatcher and its background workers.
//!
//! The dispatcher never blocks on playback: sounds and redirects go through
//! bounded queues drained by one worker each, so at most one sound plays at a
//! time and requests are handled in arrival order.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::{
    AlertSink, NotificationError, NotificationSettings, ProcessedIncidentMemo, RateLimiter,
    SnoozeClock, SystemClock,
};
use crate::config::NotificationConfig;
use crate::events::{EventBus, MonitorEvent};
use crate::models::Incident;
use crate::telemetry::{
    NOTIFICATIONS_DROPPED_TOTAL, NOTIFICATIONS_REDIRECTS_TOTAL, NOTIFICATIONS_SOUND_PLAYED_TOTAL,
};

/// Longest accepted snooze.
pub const MAX_SNOOZE_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SoundRequest {
    Speak(String),
    Play(String),
}

struct SoundJob {
    request: SoundRequest,
    reply: Option<oneshot::Sender<Result<(), NotificationError>>>,
}

struct RedirectJob {
    incident_id: String,
    url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SoundOutcome {
    Queued,
    Snoozed,
    RateLimited,
    QueueFull,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RedirectOutcome {
    Queued,
    Disabled,
    NoUrl,
    CoolingDown,
    RateLimited,
    QueueFull,
}

/// What happened to each channel of one incident notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub banner_shown: bool,
    pub sound: SoundOutcome,
    pub redirect: RedirectOutcome,
}

impl NotificationOutcome {
    fn disabled() -> Self {
        Self {
            banner_shown: false,
            sound: SoundOutcome::Disabled,
            redirect: RedirectOutcome::Disabled,
        }
    }
}

fn record_drop(channel: &'static str, reason: &'static str) {
    counter!(NOTIFICATIONS_DROPPED_TOTAL, "channel" => channel, "reason" => reason).increment(1);
}

pub struct NotificationDispatcher {
    config: NotificationConfig,
    sink: Arc<dyn AlertSink>,
    settings: Mutex<NotificationSettings>,
    clock: Arc<dyn SnoozeClock>,
    sound_limiter: RateLimiter,
    redirect_limiter: RateLimiter,
    memo: Arc<Mutex<ProcessedIncidentMemo>>,
    sound_tx: mpsc::Sender<SoundJob>,
    redirect_tx: mpsc::Sender<RedirectJob>,
    events: EventBus,
}

/// Receiving ends of the dispatcher queues, waiting for [`NotificationQueues::spawn`].
pub struct NotificationQueues {
    config: NotificationConfig,
    sink: Arc<dyn AlertSink>,
    memo: Arc<Mutex<ProcessedIncidentMemo>>,
    sound_rx: mpsc::Receiver<SoundJob>,
    redirect_rx: mpsc::Receiver<RedirectJob>,
}

/// Running sound worker, redirect worker and memo sweeper.
pub struct NotificationWorkers {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl NotificationDispatcher {
    pub fn new(
        config: NotificationConfig,
        sink: Arc<dyn AlertSink>,
        events: EventBus,
    ) -> (Self, NotificationQueues) {
        Self::with_clock(config, sink, events, Arc::new(SystemClock))
    }

    /// Like [`NotificationDispatcher::new`], reading snooze deadlines from `clock`.
    pub fn with_clock(
        config: NotificationConfig,
        sink: Arc<dyn AlertSink>,
        events: EventBus,
        clock: Arc<dyn SnoozeClock>,
    ) -> (Self, NotificationQueues) {
        let (sound_tx, sound_rx) = mpsc::channel(config.sound_queue_capacity.max(1));
        let (redirect_tx, redirect_rx) = mpsc::channel(config.redirect_queue_capacity.max(1));
        let memo = Arc::new(Mutex::new(ProcessedIncidentMemo::new()));

        let dispatcher = Self {
            sound_limiter: RateLimiter::from_config(config.sound_rate_limit),
            redirect_limiter: RateLimiter::from_config(config.redirect_rate_limit),
            settings: Mutex::new(NotificationSettings::default()),
            clock,
            memo: memo.clone(),
            sink: sink.clone(),
            config: config.clone(),
            sound_tx,
            redirect_tx,
            events,
        };
        let queues = NotificationQueues {
            config,
            sink,
            memo,
            sound_rx,
            redirect_rx,
        };
        (dispatcher, queues)
    }

    /// Notify about an incident that just became triggered.
    pub async fn notify_incident(&self, incident: &Incident) -> NotificationOutcome {
        let (enabled, snoozed, browser_redirect, sound) = {
            let mut settings = self.settings.lock().await;
            let snoozed = settings.is_snooze_active_at(self.clock.now());
            let sound = if settings.uses_spoken_sound() {
                let text = if incident.service_summary.is_empty() {
                    incident.title.clone()
                } else {
                    incident.service_summary.clone()
                };
                SoundRequest::Speak(text)
            } else {
                SoundRequest::Play(settings.sound.clone())
            };
            (settings.enabled, snoozed, settings.browser_redirect, sound)
        };

        if !enabled {
            return NotificationOutcome::disabled();
        }

        let banner_shown = self.show_banner(incident).await;
        let sound = self.enqueue_sound(incident, snoozed, sound).await;
        let redirect = if browser_redirect {
            self.enqueue_redirect(incident).await
        } else {
            RedirectOutcome::Disabled
        };

        debug!(
            incident_id = %incident.incident_id,
            banner_shown,
            ?sound,
            ?redirect,
            "Dispatched incident notification"
        );

        NotificationOutcome {
            banner_shown,
            sound,
            redirect,
        }
    }

    async fn show_banner(&self, incident: &Incident) -> bool {
        let title = if incident.service_summary.is_empty() {
            "Incident triggered".to_string()
        } else {
            format!("Incident triggered: {}", incident.service_summary)
        };
        let body = format!("#{} {}", incident.incident_number, incident.title);

        match self.sink.show_banner(&title, &body).await {
            Ok(()) => true,
            Err(err) => {
                warn!(incident_id = %incident.incident_id, error = %err, "Failed to show banner");
                false
            }
        }
    }

    async fn enqueue_sound(
        &self,
        incident: &Incident,
        snoozed: bool,
        request: SoundRequest,
    ) -> SoundOutcome {
        if snoozed {
            return SoundOutcome::Snoozed;
        }

        if !self.sound_limiter.allow().await {
            debug!(incident_id = %incident.incident_id, "Sound dropped by rate limiter");
            record_drop("sound", "rate_limited");
            return SoundOutcome::RateLimited;
        }

        match self.sound_tx.try_send(SoundJob {
            request,
            reply: None,
        }) {
            Ok(()) => SoundOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(incident_id = %incident.incident_id, "Sound queue full, dropping sound");
                record_drop("sound", "queue_full");
                SoundOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(incident_id = %incident.incident_id, "Sound worker stopped, dropping sound");
                record_drop("sound", "worker_stopped");
                SoundOutcome::QueueFull
            }
        }
    }

    async fn enqueue_redirect(&self, incident: &Incident) -> RedirectOutcome {
        if incident.html_url.is_empty() {
            return RedirectOutcome::NoUrl;
        }

        let now = Instant::now();
        let mut memo = self.memo.lock().await;
        if memo.in_cooldown(&incident.incident_id, now, self.config.redirect_cooldown()) {
            return RedirectOutcome::CoolingDown;
        }

        if !self.redirect_limiter.allow_at(now).await {
            debug!(incident_id = %incident.incident_id, "Redirect dropped by rate limiter");
            record_drop("redirect", "rate_limited");
            return RedirectOutcome::RateLimited;
        }

        match self.redirect_tx.try_send(RedirectJob {
            incident_id: incident.incident_id.clone(),
            url: incident.html_url.clone(),
        }) {
            Ok(()) => {
                memo.record(&incident.incident_id, now);
                RedirectOutcome::Queued
            }
            Err(_) => {
                warn!(incident_id = %incident.incident_id, "Redirect queue unavailable, dropping redirect");
                record_drop("redirect", "queue_full");
                RedirectOutcome::QueueFull
            }
        }
    }

    /// Play the configured sound once, bypassing the rate limiter, and wait for
    /// the worker to finish it.
    pub async fn test_sound(&self) -> Result<(), NotificationError> {
        let request = {
            let settings = self.settings.lock().await;
            if settings.uses_spoken_sound() {
                SoundRequest::Speak("This is a test notification".to_string())
            } else {
                SoundRequest::Play(settings.sound.clone())
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.sound_tx
            .try_send(SoundJob {
                request,
                reply: Some(reply_tx),
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => NotificationError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NotificationError::WorkerStopped,
            })?;

        let limit = self.config.test_sound_timeout();
        match timeout(limit, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NotificationError::WorkerStopped),
            Err(_) => Err(NotificationError::TimedOut(limit)),
        }
    }

    /// Silence sounds for `minutes`. Banners keep showing while snoozed.
    pub async fn snooze_sound(&self, minutes: u32) -> Result<DateTime<Utc>, NotificationError> {
        if minutes == 0 || minutes > MAX_SNOOZE_MINUTES {
            return Err(NotificationError::InvalidSnooze(format!(
                "minutes must be between 1 and {}, got {}",
                MAX_SNOOZE_MINUTES, minutes
            )));
        }

        let until = self.clock.now() + chrono::Duration::minutes(i64::from(minutes));
        self.settings.lock().await.snooze_until(until);
        info!(%until, "Notification sound snoozed");
        self.events.emit(MonitorEvent::NotificationSnoozed { until });
        Ok(until)
    }

    pub async fn unsnooze_sound(&self) {
        self.settings.lock().await.clear_snooze();
        info!("Notification sound unsnoozed");
        self.events.emit(MonitorEvent::NotificationUnsnoozed);
    }

    pub async fn is_snooze_active(&self) -> bool {
        self.settings.lock().await.is_snooze_active_at(self.clock.now())
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.settings.lock().await.enabled = enabled;
    }

    pub async fn set_sound(&self, sound: &str) {
        self.settings.lock().await.sound = sound.trim().to_string();
    }

    pub async fn set_browser_redirect(&self, enabled: bool) {
        self.settings.lock().await.browser_redirect = enabled;
    }

    /// Snapshot with any expired snooze already cleared.
    pub async fn settings(&self) -> NotificationSettings {
        let mut settings = self.settings.lock().await;
        settings.is_snooze_active_at(self.clock.now());
        settings.clone()
    }
}

impl NotificationQueues {
    /// Start the sound worker, redirect worker and memo sweeper.
    pub fn spawn(self, shutdown: CancellationToken) -> NotificationWorkers {
        let NotificationQueues {
            config,
            sink,
            memo,
            sound_rx,
            redirect_rx,
        } = self;

        let handles = vec![
            tokio::spawn(run_sound_worker(sound_rx, sink.clone(), shutdown.clone())),
            tokio::spawn(run_redirect_worker(redirect_rx, sink, shutdown.clone())),
            tokio::spawn(run_memo_sweeper(memo, config, shutdown.clone())),
        ];

        NotificationWorkers { shutdown, handles }
    }
}

impl NotificationWorkers {
    /// Stop all workers and wait for them. A sound already playing finishes first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Notification worker ended abnormally");
            }
        }
    }
}

async fn run_sound_worker(
    mut rx: mpsc::Receiver<SoundJob>,
    sink: Arc<dyn AlertSink>,
    shutdown: CancellationToken,
) {
    debug!("Sound worker started");
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = match &job.request {
            SoundRequest::Speak(text) => sink.speak(text).await,
            SoundRequest::Play(name) => sink.play_sound(name).await,
        };

        match &result {
            Ok(()) => counter!(NOTIFICATIONS_SOUND_PLAYED_TOTAL).increment(1),
            Err(err) => warn!(error = %err, request = ?job.request, "Sound playback failed"),
        }

        if let Some(reply) = job.reply {
            let _ = reply.send(result);
        }
    }
    debug!("Sound worker stopped");
}

async fn run_redirect_worker(
    mut rx: mpsc::Receiver<RedirectJob>,
    sink: Arc<dyn AlertSink>,
    shutdown: CancellationToken,
) {
    debug!("Redirect worker started");
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match sink.open_url(&job.url).await {
            Ok(()) => {
                counter!(NOTIFICATIONS_REDIRECTS_TOTAL).increment(1);
                info!(incident_id = %job.incident_id, "Opened incident in browser");
            }
            Err(err) => {
                warn!(incident_id = %job.incident_id, error = %err, "Failed to open incident page")
            }
        }
    }
    debug!("Redirect worker stopped");
}

async fn run_memo_sweeper(
    memo: Arc<Mutex<ProcessedIncidentMemo>>,
    config: NotificationConfig,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(config.memo_sweep_interval().max(Duration::from_secs(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = memo
                    .lock()
                    .await
                    .purge_older_than(Instant::now(), config.memo_horizon());
                if removed > 0 {
                    debug!(removed, "Purged processed-incident memo entries");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::models::{IncidentStatus, Urgency};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: StdMutex<Vec<String>>,
        hang: bool,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl AlertSink for RecordingSink {
        async fn speak(&self, text: &str) -> Result<(), NotificationError> {
            self.calls.lock().unwrap().push(format!("speak:{}", text));
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn play_sound(&self, name: &str) -> Result<(), NotificationError> {
            self.calls.lock().unwrap().push(format!("play:{}", name));
            Ok(())
        }

        async fn show_banner(&self, title: &str, _body: &str) -> Result<(), NotificationError> {
            self.calls.lock().unwrap().push(format!("banner:{}", title));
            Ok(())
        }

        async fn open_url(&self, url: &str) -> Result<(), NotificationError> {
            self.calls.lock().unwrap().push(format!("open:{}", url));
            Ok(())
        }
    }

    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl SnoozeClock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn generous_config() -> NotificationConfig {
        let unlimited = RateLimitConfig {
            burst_window_ms: 1,
            burst_limit: 1000,
        };
        NotificationConfig {
            sound_rate_limit: unlimited,
            redirect_rate_limit: unlimited,
            ..NotificationConfig::default()
        }
    }

    fn incident(id: &str) -> Incident {
        let now = Utc::now().fixed_offset();
        Incident {
            incident_id: id.to_string(),
            incident_number: 7,
            title: "Checkout latency".to_string(),
            service_id: "S1".to_string(),
            service_summary: "Checkout".to_string(),
            status: IncidentStatus::Triggered,
            html_url: format!("https://acme.pagerduty.com/incidents/{}", id),
            urgency: Urgency::High,
            alert_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn bounded_sound_queue_drops_overflow() {
        let sink = Arc::new(RecordingSink::default());
        let config = NotificationConfig {
            sound_queue_capacity: 2,
            ..generous_config()
        };
        let (dispatcher, _queues) = NotificationDispatcher::new(config, sink, EventBus::default());

        let mut outcomes = Vec::new();
        for n in 0..3 {
            outcomes.push(dispatcher.notify_incident(&incident(&format!("P{}", n))).await.sound);
        }

        assert_eq!(
            outcomes,
            vec![SoundOutcome::Queued, SoundOutcome::Queued, SoundOutcome::QueueFull]
        );
    }

    #[tokio::test]
    async fn snooze_skips_sound_but_keeps_banner() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _queues) =
            NotificationDispatcher::new(generous_config(), sink.clone(), EventBus::default());

        dispatcher.snooze_sound(10).await.unwrap();
        let outcome = dispatcher.notify_incident(&incident("P1")).await;

        assert!(outcome.banner_shown);
        assert_eq!(outcome.sound, SoundOutcome::Snoozed);
        assert_eq!(sink.calls(), vec!["banner:Incident triggered: Checkout".to_string()]);
    }

    #[tokio::test]
    async fn disabled_notifications_do_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _queues) =
            NotificationDispatcher::new(generous_config(), sink.clone(), EventBus::default());

        dispatcher.set_enabled(false).await;
        let outcome = dispatcher.notify_incident(&incident("P1")).await;

        assert_eq!(outcome, NotificationOutcome::disabled());
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn sound_rate_limit_drops_sixth_burst_request() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _queues) = NotificationDispatcher::new(
            NotificationConfig::default(),
            sink,
            EventBus::default(),
        );

        let mut queued = 0;
        for n in 0..6 {
            if dispatcher.notify_incident(&incident(&format!("P{}", n))).await.sound
                == SoundOutcome::Queued
            {
                queued += 1;
            }
        }
        assert_eq!(queued, 5);
    }

    #[tokio::test]
    async fn redirect_cooldown_suppresses_repeat() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _queues) =
            NotificationDispatcher::new(generous_config(), sink, EventBus::default());
        dispatcher.set_browser_redirect(true).await;

        let first = dispatcher.notify_incident(&incident("P1")).await;
        let second = dispatcher.notify_incident(&incident("P1")).await;
        let other = dispatcher.notify_incident(&incident("P2")).await;

        assert_eq!(first.redirect, RedirectOutcome::Queued);
        assert_eq!(second.redirect, RedirectOutcome::CoolingDown);
        assert_eq!(other.redirect, RedirectOutcome::Queued);
    }

    #[tokio::test]
    async fn workers_play_sounds_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, queues) =
            NotificationDispatcher::new(generous_config(), sink.clone(), EventBus::default());
        let workers = queues.spawn(CancellationToken::new());

        dispatcher.set_sound("siren").await;
        dispatcher.notify_incident(&incident("P1")).await;
        dispatcher.test_sound().await.unwrap();
        workers.shutdown().await;

        let plays: Vec<String> = sink
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("play:"))
            .collect();
        assert_eq!(plays, vec!["play:siren".to_string(), "play:siren".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sound_times_out_when_playback_hangs() {
        let sink = Arc::new(RecordingSink {
            hang: true,
            ..Default::default()
        });
        let (dispatcher, queues) =
            NotificationDispatcher::new(generous_config(), sink, EventBus::default());
        let _workers = queues.spawn(CancellationToken::new());

        let result = dispatcher.test_sound().await;
        assert!(matches!(
            result,
            Err(NotificationError::TimedOut(limit)) if limit == Duration::from_secs(5)
        ));
    }

    #[tokio::test]
    async fn test_sound_reports_stopped_worker() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, queues) =
            NotificationDispatcher::new(generous_config(), sink, EventBus::default());
        drop(queues);

        assert!(matches!(
            dispatcher.test_sound().await,
            Err(NotificationError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn snooze_emits_events_and_rejects_zero_minutes() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _queues) = NotificationDispatcher::new(generous_config(), sink, events);

        assert!(matches!(
            dispatcher.snooze_sound(0).await,
            Err(NotificationError::InvalidSnooze(_))
        ));

        let until = dispatcher.snooze_sound(15).await.unwrap();
        assert!(dispatcher.is_snooze_active().await);
        assert_eq!(rx.recv().await.unwrap(), MonitorEvent::NotificationSnoozed { until });

        dispatcher.unsnooze_sound().await;
        assert!(!dispatcher.is_snooze_active().await);
        assert_eq!(rx.recv().await.unwrap(), MonitorEvent::NotificationUnsnoozed);
    }

    #[tokio::test]
    async fn one_minute_snooze_expires_lazily() {
        let clock = Arc::new(ManualClock(StdMutex::new(Utc::now())));
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _queues) = NotificationDispatcher::with_clock(
            generous_config(),
            sink,
            EventBus::default(),
            clock.clone(),
        );

        dispatcher.snooze_sound(1).await.unwrap();
        clock.advance(chrono::Duration::seconds(59));
        assert!(dispatcher.is_snooze_active().await);
        assert_eq!(
            dispatcher.notify_incident(&incident("P1")).await.sound,
            SoundOutcome::Snoozed
        );

        clock.advance(chrono::Duration::seconds(2));
        assert!(!dispatcher.is_snooze_active().await);
        let settings = dispatcher.settings().await;
        assert!(!settings.snoozed);
        assert!(settings.snooze_until.is_none());
        assert_eq!(
            dispatcher.notify_incident(&incident("P2")).await.sound,
            SoundOutcome::Queued
        );
    }
}
