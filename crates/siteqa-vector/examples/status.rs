use siteqa_core::config::Config;
use siteqa_vector::LanceStore;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let settings = config.settings()?;
    let store = LanceStore::from_settings(&settings, config.base_dir())?;
    println!("index root: {}", store.root().display());
    match store.manifest() {
        Ok(m) => println!(
            "serving: generation={} embedder={} dim={} chunks={} created={}\ncorpus version: {}",
            m.generation, m.embedder_id, m.dim, m.chunk_count, m.created_at, m.corpus_version
        ),
        Err(e) => println!("no serving generation: {e:#}"),
    }
    for g in store.generations() {
        println!("  {g}");
    }
    Ok(())
}
