use std::io::Write;

use anyhow::anyhow;

use crate::controllers::paste as pastes;
use crate::diff::{Diff, DiffMode};
use crate::{App, AppError};

pub async fn run(mut app: App, old: &str, new: &str) -> anyhow::Result<()> {
    let (_, _, diff) = match pastes::compare(&mut app, old, new, DiffMode::Unified).await {
        Ok(compared) => compared,
        Err(AppError::NotFound) => return Err(anyhow!("no such paste: '{old}' or '{new}'")),
        Err(err) => return Err(err.into()),
    };

    if let Diff::Unified(text) = diff {
        std::io::stdout().lock().write_all(text.as_bytes())?;
    }
    Ok(())
}
