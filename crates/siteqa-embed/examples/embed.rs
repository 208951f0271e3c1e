use std::path::Path;

use siteqa_core::config::Config;
use siteqa_embed::get_default_embedder;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let settings = config.settings()?;
    let embedder = get_default_embedder(&settings.embedding, Path::new("."))?;
    let texts = vec!["Wie sind die Öffnungszeiten?".to_string(), "What are your opening hours?".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    let cos: f32 = embs[0].iter().zip(&embs[1]).map(|(a, b)| a * b).sum();
    println!("model={} B={} dim={} cos={:.4}", embedder.model_id(), embs.len(), embedder.dim(), cos);
    Ok(())
}
