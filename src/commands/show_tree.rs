use std::io::Write;

use anyhow::anyhow;

use crate::controllers::paste as pastes;
use crate::{App, AppError};

pub async fn run(mut app: App, id: &str) -> anyhow::Result<()> {
    let tree = match pastes::revision_tree(&mut app, id).await {
        Ok(tree) => tree,
        Err(AppError::NotFound) => return Err(anyhow!("no such paste: '{id}'")),
        Err(err) => return Err(err.into()),
    };

    let current = app.store.codec().decode(id);
    let text = tree.render_text(&app.store, current);
    std::io::stdout().lock().write_all(text.as_bytes())?;
    Ok(())
}
