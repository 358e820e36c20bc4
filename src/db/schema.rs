use sqlx::SqlitePool;

/// Bookkeeping tables live inside the same database as the data they track,
/// so they are created on demand rather than through central migrations.
const CREATE_JOB_TABLE_SQL: &str = "
create table if not exists _enrichment_jobs (
    id integer primary key,
    status text not null, -- pending, running, paused, cancelled, finished, failed
    run_generation integer not null default 0, -- bumped on every lease acquire/resume
    enrichment text not null, -- slug of enrichment
    database_name text not null,
    table_name text not null,
    filter_expr text not null, -- SQL fragment used to filter rows
    config text not null, -- JSON dictionary of config
    started_at text not null,
    initialized_at text, -- when the initialize hook completed
    finished_at text, -- when completed, cancelled or failed
    cancel_reason text, -- null or reason for pause/cancellation
    next_cursor text, -- next cursor to fetch
    row_count integer not null, -- number of rows to enrich at start
    done_count integer not null, -- number of rows processed
    error_count integer not null, -- number of rows with errors encountered
    actor_id text -- optional ID of actor who created the job
)";

const CREATE_ERROR_TABLE_SQL: &str = "
create table if not exists _enrichment_errors (
    id integer primary key,
    job_id integer references _enrichment_jobs(id),
    created_at text not null,
    row_pks text not null, -- JSON list of row primary keys
    error text not null,
    trace text -- optional diagnostic trace
)";

const CREATE_MESSAGE_TABLE_SQL: &str = "
create table if not exists _enrichment_messages (
    id integer primary key,
    job_id integer references _enrichment_jobs(id),
    created_at text not null,
    message text not null
)";

/// Create the bookkeeping tables if they do not exist yet.
/// Safe to call repeatedly.
pub async fn ensure_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_JOB_TABLE_SQL).execute(pool).await?;
    sqlx::query(CREATE_ERROR_TABLE_SQL).execute(pool).await?;
    sqlx::query(CREATE_MESSAGE_TABLE_SQL).execute(pool).await?;
    Ok(())
}
