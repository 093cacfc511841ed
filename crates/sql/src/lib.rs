#![doc = include_str!("../README.md")]

//! # SQL Backend
//!
//! [`SqlAdapter`] plugs a SQL table into a crudstore
//! [`DataStore`](crudstore_orm::DataStore). Statements run on a shared
//! [`Connection`]; [`SqliteConnection`] is the bundled implementation.

#![forbid(unsafe_code)]

mod adapter;
mod connection;
mod sqlite;
mod statement;

pub use adapter::{SqlAdapter, SqlAdapterBuilder};
pub use connection::{Connect, Connection, Field, FromEnv, Param, Row, positional};
pub use sqlite::{ConnectOptions, SqliteConnection};
pub use statement::Statements;
