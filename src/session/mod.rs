//! Client session driver.
//!
//! One `Session` per accepted connection: it authenticates the client,
//! parses commands, asks the router where each statement belongs, and pumps
//! reply packets back from the selected backends. Statement-level failures
//! (routing rejections, backend errors) are answered with an ERR packet and
//! the session keeps running; only client-side socket failures end it.

mod context;
mod merge;
mod state;

pub use state::{SessionState, TransStage, TransactionState};

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::backend::BackendRegistry;
use crate::config::AuthConfig;
use crate::metrics::metrics;
use crate::parser::StatementType;
use crate::pool::{ConnectionError, PoolManager};
use crate::protocol::{
    compute_auth_response, has_master_hint, status_flags, ClientCommand, EofPacket, ErrPacket,
    HandshakeResponse, InitialHandshake, OkPacket, Packet, PacketCodec, ResponseError,
    ResponseEvent,
};
use crate::router::{RouteError, RoutePlan, RouteTarget, Router};

use context::GroupContext;
use merge::ResultMerge;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("backend error: {0}")]
    Backend(#[from] ConnectionError),

    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl SessionError {
    /// Failures of the backend side are answered with an ERR packet and the
    /// client connection keeps running; client-side failures end the session.
    fn is_statement_scoped(&self) -> bool {
        matches!(
            self,
            SessionError::Backend(_) | SessionError::Response(_) | SessionError::Protocol(_)
        )
    }
}

/// One client connection
pub struct Session {
    id: u32,
    state: SessionState,
    trans: TransactionState,
    /// Backend context held open for the lifetime of a pinned transaction
    trans_ctx: Option<GroupContext>,
    registry: Arc<BackendRegistry>,
    pool: Arc<PoolManager>,
    router: Arc<Router>,
    auth: AuthConfig,
}

impl Session {
    pub fn new(
        id: u32,
        registry: Arc<BackendRegistry>,
        pool: Arc<PoolManager>,
        router: Arc<Router>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            id,
            state: SessionState::new(),
            trans: TransactionState::default(),
            trans_ctx: None,
            registry,
            pool,
            router,
            auth,
        }
    }

    pub async fn run<S>(mut self, stream: S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut client = Framed::new(stream, PacketCodec);

        if !self.handshake(&mut client).await? {
            return Ok(());
        }

        let result = self.command_loop(&mut client).await;

        // a socket abandoned mid-transaction carries backend state the pool
        // cannot reconcile
        if let Some(mut ctx) = self.trans_ctx.take() {
            ctx.conn.mark_unreusable();
        }
        result
    }

    /// Greet the client and verify its credentials. Returns false when the
    /// login was denied (the session is over but not an error).
    async fn handshake<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
    ) -> Result<bool, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let greeting = InitialHandshake::new(self.id);
        client.send(greeting.encode()).await?;

        let packet = client
            .next()
            .await
            .ok_or(SessionError::ClientDisconnected)??;
        let response = HandshakeResponse::parse(&packet.payload)
            .ok_or_else(|| SessionError::Protocol("malformed handshake response".into()))?;

        let expected = compute_auth_response(&self.auth.password, &greeting.scramble);
        if response.username != self.auth.user || response.auth_response != expected {
            warn!(session = self.id, user = %response.username, "access denied");
            let message = format!("Access denied for user '{}'", response.username);
            let err = ErrPacket::new(1045, "28000", &message);
            client.send(err.encode(2, response.capability_flags)).await?;
            return Ok(false);
        }

        self.state.set_from_handshake(
            response.username,
            response.database,
            response.capability_flags,
            response.character_set,
        );
        client
            .send(OkPacket::new().encode(2, self.state.capability_flags))
            .await?;

        info!(
            session = self.id,
            user = %self.state.username,
            database = self.state.database.as_deref().unwrap_or(""),
            "session established"
        );
        Ok(true)
    }

    async fn command_loop<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let packet = match client.next().await {
                Some(Ok(packet)) => packet,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            };

            match ClientCommand::parse(&packet.payload) {
                ClientCommand::Quit => {
                    debug!(session = self.id, "client quit");
                    return Ok(());
                }
                ClientCommand::Ping => self.send_ok(client).await?,
                ClientCommand::InitDb(db) => {
                    debug!(session = self.id, database = %db, "switching default database");
                    self.state.database = Some(db);
                    self.send_ok(client).await?;
                }
                ClientCommand::Query(sql) => self.handle_query(client, &sql).await?,
                ClientCommand::FieldList { .. } => self.handle_field_list(client, packet).await?,
                ClientCommand::Unknown(byte, _) => {
                    warn!(session = self.id, command = byte, "unsupported command");
                    self.send_err(client, 1047, "08S01", "unknown command")
                        .await?;
                }
            }
        }
    }

    async fn handle_query<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        sql: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let master_hint = has_master_hint(sql);

        let plan = match self
            .router
            .route_statement(sql, self.trans.is_active(), master_hint)
        {
            Ok(plan) => plan,
            Err(e) => return self.reject_statement(client, sql, e).await,
        };

        match plan.stmt_type {
            StatementType::Begin => return self.handle_begin(client).await,
            StatementType::Commit | StatementType::Rollback => {
                return self.handle_transaction_end(client, sql).await;
            }
            StatementType::Use => return self.handle_use(client, sql).await,
            StatementType::Set if self.trans_ctx.is_none() => {
                if let Some((name, value)) = parse_set_statement(sql) {
                    debug!(session = self.id, var = %name, value = %value, "SET handled locally");
                    self.state.set_session_var(name, value);
                    return self.send_ok(client).await;
                }
                // multi-assignment and user-variable SETs go to a backend
            }
            _ => {}
        }

        let target_label = match plan.target {
            RouteTarget::Master => "master",
            RouteTarget::Replica => "replica",
        };
        metrics().record_route(target_label, plan.is_scatter());

        let query_type = query_type_label(plan.stmt_type);
        let group_label = if let Some(group) = self.trans.pinned_group() {
            group.to_string()
        } else if plan.is_scatter() {
            "scatter".to_string()
        } else {
            plan.groups[0].clone()
        };

        let result = if self.trans.is_active() {
            self.execute_in_transaction(client, &plan, sql).await
        } else if plan.is_scatter() {
            self.execute_scatter(client, &plan, sql).await
        } else {
            self.execute_single(client, &plan, sql).await
        };

        match result {
            Ok(()) => {
                metrics().record_query(query_type, &group_label, started.elapsed().as_secs_f64());
                Ok(())
            }
            Err(e) if e.is_statement_scoped() => {
                error!(
                    session = self.id,
                    sql = %truncate_sql(sql, 256),
                    error = %e,
                    "statement failed on backend"
                );
                metrics().record_query_error(query_type);
                // an interrupted transaction cannot resume on another socket
                if let Some(mut ctx) = self.trans_ctx.take() {
                    ctx.conn.mark_unreusable();
                }
                self.trans.end();
                let message = format!("backend failure: {e}");
                self.send_err(client, 2013, "HY000", &message).await
            }
            Err(e) => Err(e),
        }
    }

    async fn reject_statement<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        sql: &str,
        err: RouteError,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        warn!(
            session = self.id,
            sql = %truncate_sql(sql, 256),
            error = %err,
            "statement rejected"
        );
        metrics().record_query_error("route");
        self.send_err(client, err.code(), err.sql_state(), &err.to_string())
            .await
    }

    /// BEGIN is acknowledged locally; the backend transaction starts lazily
    /// on the first statement that actually routes somewhere.
    async fn handle_begin<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.trans.stage() != TransStage::Pinned {
            self.trans.begin();
        }
        let mut ok = OkPacket::new();
        ok.status_flags |= status_flags::SERVER_STATUS_IN_TRANS;
        client.send(ok.encode(1, self.state.capability_flags)).await?;
        Ok(())
    }

    /// COMMIT/ROLLBACK goes to the pinned group if one exists; a transaction
    /// that never routed a statement has nothing to tell any backend.
    async fn handle_transaction_end<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        sql: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(mut ctx) = self.trans_ctx.take() else {
            self.trans.end();
            return self.send_ok(client).await;
        };

        let outcome = async {
            ctx.send_command(Packet::query(sql)).await?;
            self.forward_reply(client, &mut ctx).await
        }
        .await;
        self.trans.end();
        match outcome {
            Ok(()) => {
                self.pool.release(ctx.conn).await;
                Ok(())
            }
            Err(e) if e.is_statement_scoped() => {
                ctx.conn.mark_unreusable();
                error!(
                    session = self.id,
                    sql = %truncate_sql(sql, 256),
                    error = %e,
                    "transaction end failed on backend"
                );
                metrics().record_query_error("transaction");
                let message = format!("backend failure: {e}");
                self.send_err(client, 2013, "HY000", &message).await
            }
            Err(e) => {
                ctx.conn.mark_unreusable();
                Err(e)
            }
        }
    }

    async fn handle_use<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        sql: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let db = sql
            .trim()
            .trim_end_matches(';')
            .get(3..)
            .unwrap_or("")
            .trim()
            .trim_matches('`');
        if db.is_empty() {
            return self.send_err(client, 1046, "3D000", "no database selected").await;
        }
        debug!(session = self.id, database = %db, "switching default database");
        self.state.database = Some(db.to_string());
        self.send_ok(client).await
    }

    /// COM_FIELD_LIST is forwarded to the default group's master as-is.
    async fn handle_field_list<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        packet: Packet,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let group = self.router.default_group().to_string();
        let mut ctx = match self.open_context(&group, RouteTarget::Master).await {
            Ok(ctx) => ctx,
            Err(err) => {
                client.send(err.encode(1, self.state.capability_flags)).await?;
                return Ok(());
            }
        };
        ctx.send_command(Packet::new(0, packet.payload)).await?;
        self.forward_reply(client, &mut ctx).await?;
        self.pool.release(ctx.conn).await;
        Ok(())
    }

    async fn execute_single<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        plan: &RoutePlan,
        sql: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let group = &plan.groups[0];
        let mut ctx = match self.open_context(group, plan.target).await {
            Ok(ctx) => ctx,
            Err(err) => {
                client.send(err.encode(1, self.state.capability_flags)).await?;
                return Ok(());
            }
        };

        ctx.send_command(Packet::query(sql)).await?;
        self.forward_reply(client, &mut ctx).await?;

        // a forwarded SET leaves variables behind on the socket
        if plan.stmt_type == StatementType::Set {
            ctx.conn.mark_unreusable();
        }
        self.pool.release(ctx.conn).await;
        Ok(())
    }

    async fn execute_in_transaction<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        plan: &RoutePlan,
        sql: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.trans.stage() {
            TransStage::Idle => self.execute_single(client, plan, sql).await,
            TransStage::Pinned => {
                // everything routes to the pinned group until COMMIT/ROLLBACK
                let mut ctx = self.trans_ctx.take().ok_or_else(|| {
                    SessionError::Protocol("pinned transaction lost its connection".into())
                })?;
                let outcome = async {
                    ctx.send_command(Packet::query(sql)).await?;
                    self.forward_reply(client, &mut ctx).await
                }
                .await;
                match outcome {
                    Ok(()) => {
                        // a forwarded SET leaves variables behind; the socket
                        // must not return to the pool after COMMIT
                        if plan.stmt_type == StatementType::Set {
                            ctx.conn.mark_unreusable();
                        }
                        self.trans_ctx = Some(ctx);
                        Ok(())
                    }
                    Err(e) => {
                        ctx.conn.mark_unreusable();
                        Err(e)
                    }
                }
            }
            TransStage::Pending => {
                if plan.groups.len() != 1 {
                    self.trans.end();
                    return self
                        .send_err(
                            client,
                            1105,
                            "HY000",
                            "statement inside a transaction must resolve to a single shard",
                        )
                        .await;
                }
                let group = plan.groups[0].clone();
                let mut ctx = match self.open_context(&group, RouteTarget::Master).await {
                    Ok(ctx) => ctx,
                    Err(err) => {
                        self.trans.end();
                        client.send(err.encode(1, self.state.capability_flags)).await?;
                        return Ok(());
                    }
                };

                // deferred BEGIN, now that the transaction has a home
                ctx.send_command(Packet::query("BEGIN")).await?;
                self.drain_reply(&mut ctx).await?;
                if let Some(err) = ctx.tracker.last_err().cloned() {
                    self.trans.end();
                    self.pool.release(ctx.conn).await;
                    client.send(err.encode(1, self.state.capability_flags)).await?;
                    return Ok(());
                }

                debug!(session = self.id, group = %group, "transaction pinned");
                self.trans.pin(group);
                let outcome = async {
                    ctx.send_command(Packet::query(sql)).await?;
                    self.forward_reply(client, &mut ctx).await
                }
                .await;
                match outcome {
                    Ok(()) => {
                        if plan.stmt_type == StatementType::Set {
                            ctx.conn.mark_unreusable();
                        }
                        self.trans_ctx = Some(ctx);
                        Ok(())
                    }
                    Err(e) => {
                        ctx.conn.mark_unreusable();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Fan-out read: field definitions come from the first shard, rows stream
    /// from every shard under the LIMIT, a single terminator goes last.
    async fn execute_scatter<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        plan: &RoutePlan,
        sql: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let caps = self.state.capability_flags;
        let mut merge = ResultMerge::new(plan.groups.len(), plan.limit);
        let mut saw_resultset = false;

        for (index, group) in plan.groups.iter().enumerate() {
            let first = index == 0;
            let mut ctx = match self.open_context(group, plan.target).await {
                Ok(ctx) => ctx,
                Err(err) => {
                    client.send(err.encode(merge.next_seq(), caps)).await?;
                    return Ok(());
                }
            };

            ctx.send_command(Packet::query(sql)).await?;
            let aborted = self
                .forward_shard_reply(client, &mut ctx, &mut merge, first, &mut saw_resultset)
                .await?;
            self.pool.release(ctx.conn).await;
            if aborted {
                return Ok(());
            }
            merge.shard_done();
        }

        if saw_resultset {
            client.send(EofPacket::new().encode(merge.next_seq())).await?;
        } else {
            let seq = merge.next_seq();
            client.send(merge.merged_ok().encode(seq, caps)).await?;
        }
        debug!(
            session = self.id,
            shards = plan.groups.len(),
            rows = merge.rows_forwarded(),
            "fan-out complete"
        );
        Ok(())
    }

    /// Pump one shard's reply into the client, re-sequencing every forwarded
    /// packet. Returns true when the fan-out must stop (backend ERR).
    async fn forward_shard_reply<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        ctx: &mut GroupContext,
        merge: &mut ResultMerge,
        first: bool,
        saw_resultset: &mut bool,
    ) -> Result<bool, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while !ctx.is_done() {
            let packet = ctx.conn.recv().await?;
            let event = match ctx.tracker.feed(&packet.payload) {
                Ok(event) => event,
                Err(e) => {
                    ctx.conn.mark_unreusable();
                    return Err(e.into());
                }
            };

            match event {
                ResponseEvent::ColumnCount(_) => {
                    *saw_resultset = true;
                    if first {
                        client
                            .send(Packet::new(merge.next_seq(), packet.payload))
                            .await?;
                    }
                }
                ResponseEvent::FieldDef | ResponseEvent::FieldsTerminated => {
                    if first {
                        client
                            .send(Packet::new(merge.next_seq(), packet.payload))
                            .await?;
                    }
                }
                ResponseEvent::Row => {
                    if merge.take_row() {
                        client
                            .send(Packet::new(merge.next_seq(), packet.payload))
                            .await?;
                    }
                }
                // one terminator is synthesized after the last shard
                ResponseEvent::RowsTerminated => {}
                ResponseEvent::Ok => {
                    if let Some(ok) = ctx.tracker.last_ok() {
                        merge.record_ok(ok);
                    }
                }
                ResponseEvent::Err => {
                    client
                        .send(Packet::new(merge.next_seq(), packet.payload))
                        .await?;
                    return Ok(true);
                }
                ResponseEvent::LocalInfileRequest | ResponseEvent::Plain => {
                    ctx.conn.mark_unreusable();
                    return Err(SessionError::Protocol(
                        "unexpected reply during fan-out".into(),
                    ));
                }
            }
        }
        Ok(false)
    }

    /// Forward one complete reply verbatim, backend sequence ids included.
    async fn forward_reply<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        ctx: &mut GroupContext,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while !ctx.is_done() {
            let packet = ctx.conn.recv().await?;
            let event = match ctx.tracker.feed(&packet.payload) {
                Ok(event) => event,
                Err(e) => {
                    ctx.conn.mark_unreusable();
                    return Err(e.into());
                }
            };
            client.send(packet).await?;

            if event == ResponseEvent::LocalInfileRequest {
                self.relay_infile_data(client, ctx).await?;
            }
        }
        Ok(())
    }

    /// Consume a reply without forwarding it (injected BEGIN).
    async fn drain_reply(&self, ctx: &mut GroupContext) -> Result<(), SessionError> {
        while !ctx.is_done() {
            let packet = ctx.conn.recv().await?;
            if let Err(e) = ctx.tracker.feed(&packet.payload) {
                ctx.conn.mark_unreusable();
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// LOCAL INFILE: the client streams file data to the backend, terminated
    /// by an empty packet.
    async fn relay_infile_data<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        ctx: &mut GroupContext,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let packet = client
                .next()
                .await
                .ok_or(SessionError::ClientDisconnected)??;
            let done = packet.payload.is_empty();
            ctx.conn.send(packet).await?;
            if done {
                return Ok(());
            }
        }
    }

    /// Pick a backend in `group` and check out a socket for it. Failures are
    /// statement-scoped and come back as the ERR packet to send.
    async fn open_context(
        &self,
        group_name: &str,
        target: RouteTarget,
    ) -> Result<GroupContext, ErrPacket> {
        let Some(group) = self.registry.get(group_name) else {
            let message = format!("unknown db group '{group_name}'");
            return Err(ErrPacket::new(1105, "HY000", &message));
        };

        let backend = match target {
            RouteTarget::Master => group.select_write(),
            RouteTarget::Replica => group.select_read(),
        };
        let Some(backend) = backend else {
            warn!(session = self.id, group = group_name, "no backend available");
            let message = format!("no backend available in group '{group_name}'");
            return Err(ErrPacket::new(1105, "HY000", &message));
        };

        match self
            .pool
            .acquire(&backend.addr, self.state.database.as_deref())
            .await
        {
            Ok(mut conn) => {
                // locally answered SETs reach the backend here
                if let Err(e) = conn.sync_session_vars(self.state.session_vars()).await {
                    warn!(
                        session = self.id,
                        group = group_name,
                        error = %e,
                        "session variable replay failed"
                    );
                    let message = format!("failed to apply session variables: {e}");
                    return Err(ErrPacket::new(1105, "HY000", &message));
                }
                Ok(GroupContext::new(group_name.to_string(), conn))
            }
            Err(e) => {
                error!(
                    session = self.id,
                    group = group_name,
                    addr = %backend.addr,
                    error = %e,
                    "backend checkout failed"
                );
                let message = format!("failed to reach backend: {e}");
                Err(ErrPacket::new(1105, "HY000", &message))
            }
        }
    }

    async fn send_ok<S>(&mut self, client: &mut Framed<S, PacketCodec>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut ok = OkPacket::new();
        if self.trans.is_active() {
            ok.status_flags |= status_flags::SERVER_STATUS_IN_TRANS;
        }
        client.send(ok.encode(1, self.state.capability_flags)).await?;
        Ok(())
    }

    async fn send_err<S>(
        &mut self,
        client: &mut Framed<S, PacketCodec>,
        code: u16,
        sql_state: &str,
        message: &str,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let err = ErrPacket::new(code, sql_state, message);
        client.send(err.encode(1, self.state.capability_flags)).await?;
        Ok(())
    }
}

fn query_type_label(stmt_type: StatementType) -> &'static str {
    match stmt_type {
        StatementType::Select => "select",
        StatementType::Insert => "insert",
        StatementType::Update => "update",
        StatementType::Delete => "delete",
        StatementType::Show => "show",
        StatementType::Set => "set",
        _ => "other",
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn unquote(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string()
}

/// Pull a single session-variable assignment out of a SET statement.
/// Returns None for shapes that must reach a real server (global and user
/// variables, multi-assignment lists).
fn parse_set_statement(sql: &str) -> Option<(String, String)> {
    let sql = sql.trim().trim_end_matches(';').trim();
    if !starts_with_ignore_case(sql, "SET ") {
        return None;
    }
    let rest = sql[4..].trim();

    if starts_with_ignore_case(rest, "NAMES") {
        return Some(("names".to_string(), unquote(&rest[5..])));
    }
    if starts_with_ignore_case(rest, "CHARACTER SET") {
        return Some(("charset".to_string(), unquote(&rest[13..])));
    }
    if rest.contains(',') {
        return None;
    }

    let (name, value) = rest.split_once('=')?;
    let mut name = name.trim();
    if starts_with_ignore_case(name, "@@global.") || starts_with_ignore_case(name, "GLOBAL ") {
        return None;
    }
    if starts_with_ignore_case(name, "@@session.") {
        name = &name[10..];
    } else if starts_with_ignore_case(name, "@@local.") {
        name = &name[8..];
    } else if starts_with_ignore_case(name, "SESSION ") {
        name = &name[8..];
    } else if let Some(stripped) = name.strip_prefix("@@") {
        name = stripped;
    } else if name.starts_with('@') {
        // user variable, needs a real server
        return None;
    }

    Some((name.trim().to_lowercase(), unquote(value)))
}

fn truncate_sql(sql: &str, max_len: usize) -> std::borrow::Cow<'_, str> {
    if sql.len() <= max_len {
        std::borrow::Cow::Borrowed(sql)
    } else {
        let mut end = max_len;
        while !sql.is_char_boundary(end) {
            end -= 1;
        }
        std::borrow::Cow::Owned(format!("{}...", &sql[..end]))
    }
}
