//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled          |
//! |----------|---------------------------|
//! | `serve`  | `Serve`, `InitDb`         |
//! | `deck`   | `Merge`, `Share`, `Decks` |
//! | `tokens` | `Tokens`                  |
//! | `config` | `Config`                  |

pub mod config;
pub mod deck;
pub mod serve;
pub mod tokens;

pub use config::cmd_config;
pub use deck::{cmd_decks, cmd_merge, cmd_share};
pub use serve::{cmd_init_db, cmd_serve};
pub use tokens::cmd_tokens;
