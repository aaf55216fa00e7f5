use std::{env, fmt};

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool as ConnectionPool, PooledConnection};
use diesel::result::DatabaseErrorKind::UniqueViolation;
use diesel::result::Error::{DatabaseError, NotFound};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenv::dotenv;

pub type Result<T> = std::result::Result<T, Error>;
pub type Pool = ConnectionPool<ConnectionManager<SqliteConnection>>;
pub type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Open a pooled connection to the store at `database_url` and bring its
/// schema up to date
pub fn connect(database_url: &str) -> Result<Pool> {
	let manager = ConnectionManager::<SqliteConnection>::new(database_url);
	let pool = ConnectionPool::builder()
		.connection_customizer(Box::new(ConnectionSettings))
		.build(manager)?;

	let conn = &mut pool.get()?;
	run_migrations(conn)?;
	Ok(pool)
}

/// Open the store named by `DATABASE_URL`
///
/// Loads `.env` from the working directory first
pub fn connect_from_env() -> Result<Pool> {
	dotenv().ok();
	let database_url = env::var("DATABASE_URL")
		.map_err(|_| Error::Connection("DATABASE_URL must be set".to_string()))?;
	connect(&database_url)
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
	conn.run_pending_migrations(MIGRATIONS)
		.map(|_| ())
		.map_err(|e| Error::Migration(e.to_string()))
}

/// Applied to every connection the pool hands out
///
/// The busy timeout keeps concurrent writers queued instead of failing,
/// WAL lets readers run alongside them
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionSettings {
	fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
		conn.batch_execute(
			"PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
		)
		.map_err(diesel::r2d2::Error::QueryError)
	}
}

/// Error that can occur when querying against the database
#[derive(Debug, PartialEq)]
pub enum Error {
	RecordAlreadyExists,
	RecordNotFound,
	Connection(String),
	Migration(String),
	/// Used as a catch-all for the remaining diesel errors
	DatabaseError(diesel::result::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RecordAlreadyExists => write!(f, "record violates a unique constraint"),
			Error::RecordNotFound => write!(f, "record does not exist"),
			Error::Connection(e) => write!(f, "opening database connection: {}", e),
			Error::Migration(e) => write!(f, "running migrations: {}", e),
			Error::DatabaseError(e) => write!(f, "database error: {:?}", e),
		}
	}
}

impl std::error::Error for Error {}

impl From<diesel::result::Error> for Error {
	fn from(e: diesel::result::Error) -> Self {
		match e {
			DatabaseError(UniqueViolation, _) => Error::RecordAlreadyExists,
			NotFound => Error::RecordNotFound,

			_ => Error::DatabaseError(e),
		}
	}
}

impl From<diesel::r2d2::PoolError> for Error {
	fn from(e: diesel::r2d2::PoolError) -> Self {
		Error::Connection(e.to_string())
	}
}
