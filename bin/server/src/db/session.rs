//! SQLite-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaybot_conversation::{
    ImageResolution, Message, Session, SessionError, SessionOptions, SessionStore, UsageCounters,
};
use relaybot_core::ConversationId;
use rootcause::Report;
use sqlx::FromRow;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

const SELECT_SESSION: &str = r#"
    SELECT id, context, usage_completion, usage_transcription, usage_image,
           opt_relay_transcript, opt_synth_voice, opt_image_resolution,
           opt_temperature, opt_max_context, opt_active_model,
           created_at, updated_at
    FROM sessions
    WHERE id = ?1
"#;

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    context: String,
    usage_completion: i64,
    usage_transcription: i64,
    usage_image: i64,
    opt_relay_transcript: bool,
    opt_synth_voice: bool,
    opt_image_resolution: String,
    opt_temperature: f64,
    opt_max_context: i64,
    opt_active_model: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, SessionError> {
        let id = ConversationId::new(self.id);
        let corrupt = |reason: String| SessionError::Corrupt {
            id: id.clone(),
            reason,
        };

        let context: Vec<Message> = serde_json::from_str(&self.context)
            .map_err(|e| corrupt(format!("invalid context: {e}")))?;
        let counter = |name: &str, value: i64| {
            u64::try_from(value).map_err(|_| corrupt(format!("negative {name}: {value}")))
        };
        let usage = UsageCounters::from_raw(
            counter("usage_completion", self.usage_completion)?,
            counter("usage_transcription", self.usage_transcription)?,
            counter("usage_image", self.usage_image)?,
        );
        let image_resolution: ImageResolution = self.opt_image_resolution.parse().map_err(corrupt)?;
        let max_context = usize::try_from(self.opt_max_context)
            .map_err(|_| corrupt(format!("invalid max context: {}", self.opt_max_context)))?;

        let options = SessionOptions {
            temperature: self.opt_temperature,
            max_context,
            image_resolution,
            relay_transcripts: self.opt_relay_transcript,
            synthesize_voice: self.opt_synth_voice,
            active_model: self.opt_active_model,
        };

        Ok(Session::restore(
            id,
            context,
            usage,
            options,
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Values bound when writing a session.
struct SessionParams {
    id: String,
    context: String,
    usage_completion: i64,
    usage_transcription: i64,
    usage_image: i64,
    max_context: i64,
}

impl SessionParams {
    /// Encodes everything that can fail before any statement runs.
    fn encode(session: &Session) -> Result<Self, SessionError> {
        let id = session.id();
        let too_large = |name: &str| SessionError::StorageFailed {
            reason: format!("{name} out of range for conversation {id}"),
        };
        let usage = session.usage();
        Ok(Self {
            id: id.to_string(),
            context: serde_json::to_string(session.context()).map_err(|e| {
                SessionError::StorageFailed {
                    reason: format!("failed to encode context: {e}"),
                }
            })?,
            usage_completion: i64::try_from(usage.completion_units())
                .map_err(|_| too_large("usage_completion"))?,
            usage_transcription: i64::try_from(usage.transcription_seconds())
                .map_err(|_| too_large("usage_transcription"))?,
            usage_image: i64::try_from(usage.image_count()).map_err(|_| too_large("usage_image"))?,
            max_context: i64::try_from(session.options().max_context)
                .map_err(|_| too_large("opt_max_context"))?,
        })
    }
}

fn storage_error(e: sqlx::Error) -> SessionError {
    SessionError::StorageFailed {
        reason: e.to_string(),
    }
}

/// Session store over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `url` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(url: &str) -> Result<Self, Report<SessionError>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(storage_error)?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<(), Report<SessionError>> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SessionError::StorageFailed {
                reason: format!("migration failed: {e}"),
            })?;
        Ok(())
    }

    async fn fetch(&self, id: &ConversationId) -> Result<Option<Session>, Report<SessionError>> {
        let row: Option<SessionRow> = sqlx::query_as(SELECT_SESSION)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(row.try_into_session()?)),
            None => Ok(None),
        }
    }

    /// Inserts a fresh row. Returns false if one already existed.
    async fn insert_default(
        &self,
        session: &Session,
        on_conflict_ignore: bool,
    ) -> Result<bool, Report<SessionError>> {
        let params = SessionParams::encode(session)?;
        let options = session.options();
        let statement = if on_conflict_ignore {
            r#"
            INSERT INTO sessions
                (id, context, usage_completion, usage_transcription, usage_image,
                 opt_relay_transcript, opt_synth_voice, opt_image_resolution,
                 opt_temperature, opt_max_context, opt_active_model, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO NOTHING
            "#
        } else {
            r#"
            INSERT INTO sessions
                (id, context, usage_completion, usage_transcription, usage_image,
                 opt_relay_transcript, opt_synth_voice, opt_image_resolution,
                 opt_temperature, opt_max_context, opt_active_model, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#
        };

        let result = sqlx::query(statement)
            .bind(&params.id)
            .bind(&params.context)
            .bind(params.usage_completion)
            .bind(params.usage_transcription)
            .bind(params.usage_image)
            .bind(options.relay_transcripts)
            .bind(options.synthesize_voice)
            .bind(options.image_resolution.as_str())
            .bind(options.temperature)
            .bind(params.max_context)
            .bind(&options.active_model)
            .bind(session.created_at())
            .bind(session.updated_at())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(storage_error(e).into()),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn get(&self, id: &ConversationId) -> Result<Session, Report<SessionError>> {
        self.fetch(id)
            .await?
            .ok_or_else(|| SessionError::NotFound { id: id.clone() }.into())
    }

    #[instrument(skip(self, defaults), fields(conversation_id = %id))]
    async fn create(
        &self,
        id: &ConversationId,
        defaults: &SessionOptions,
    ) -> Result<Session, Report<SessionError>> {
        let session = Session::new(id.clone(), defaults.clone());
        if !self.insert_default(&session, false).await? {
            return Err(SessionError::AlreadyExists { id: id.clone() }.into());
        }
        info!("created session");
        Ok(session)
    }

    #[instrument(skip(self, defaults), fields(conversation_id = %id))]
    async fn get_or_create(
        &self,
        id: &ConversationId,
        defaults: &SessionOptions,
    ) -> Result<Session, Report<SessionError>> {
        if let Some(session) = self.fetch(id).await? {
            return Ok(session);
        }
        // Concurrent first contacts race on the insert; the loser reads the
        // winner's row.
        let fresh = Session::new(id.clone(), defaults.clone());
        if self.insert_default(&fresh, true).await? {
            info!("created session");
        }
        self.get(id).await
    }

    #[instrument(skip(self, session), fields(conversation_id = %session.id()))]
    async fn save(&self, session: &Session) -> Result<(), Report<SessionError>> {
        let params = SessionParams::encode(session)?;
        let options = session.options();

        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, context, usage_completion, usage_transcription, usage_image,
                 opt_relay_transcript, opt_synth_voice, opt_image_resolution,
                 opt_temperature, opt_max_context, opt_active_model, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                context = excluded.context,
                usage_completion = excluded.usage_completion,
                usage_transcription = excluded.usage_transcription,
                usage_image = excluded.usage_image,
                opt_relay_transcript = excluded.opt_relay_transcript,
                opt_synth_voice = excluded.opt_synth_voice,
                opt_image_resolution = excluded.opt_image_resolution,
                opt_temperature = excluded.opt_temperature,
                opt_max_context = excluded.opt_max_context,
                opt_active_model = excluded.opt_active_model,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.context)
        .bind(params.usage_completion)
        .bind(params.usage_transcription)
        .bind(params.usage_image)
        .bind(options.relay_transcripts)
        .bind(options.synthesize_voice)
        .bind(options.image_resolution.as_str())
        .bind(options.temperature)
        .bind(params.max_context)
        .bind(&options.active_model)
        .bind(session.created_at())
        .bind(session.updated_at())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        debug!(messages = session.context().len(), "saved session");
        Ok(())
    }

    async fn usage_totals(&self) -> Result<UsageCounters, Report<SessionError>> {
        // Summed here rather than with SUM(), which errors on overflow.
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            "SELECT usage_completion, usage_transcription, usage_image FROM sessions",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let counters: Vec<UsageCounters> = rows
            .into_iter()
            .map(|(completion, transcription, image)| {
                UsageCounters::from_raw(
                    completion.max(0).unsigned_abs(),
                    transcription.max(0).unsigned_abs(),
                    image.max(0).unsigned_abs(),
                )
            })
            .collect();
        Ok(UsageCounters::sum(&counters))
    }
}
