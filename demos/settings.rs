//! Shared settings persisted to disk
//!
//! Two features hold handles to the same persisted settings. A write through
//! either one is seen by the other and saved as JSON.

use serde::{Deserialize, Serialize};
use statebox::reference::FileBackend;
use statebox::{key_path, Persistence, Shared, SharedReader};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Settings {
    volume: u8,
    theme: String,
    nickname: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Shared settings ===\n");

    let dir = tempfile::tempdir()?;
    let persistence = Persistence::new(FileBackend::new(dir.path()));

    println!("1. Opening the same key twice");
    let settings = Shared::persisted(&persistence, "settings", Settings::default())?;
    let player = Shared::persisted(&persistence, "settings", Settings::default())?;
    println!("   one reference: {}", settings.reference_id() == player.reference_id());

    println!("\n2. Watching the volume from a read-only handle");
    let volume: SharedReader<u8> = settings.reader().project(key_path!(Settings => volume));
    let _watch = volume.subscribe(|volume| println!("   [volume] {volume}"));

    println!("\n3. Writing through a projection");
    player.project(key_path!(Settings => volume)).set(7);
    player.update(|settings| settings.theme = "dark".to_string());
    println!("   settings: {:?}", settings.get());

    println!("\n4. Optional members");
    match settings.project_optional(key_path!(Settings => nickname)) {
        Some(nickname) => println!("   nickname: {}", nickname.get()),
        None => println!("   no nickname yet"),
    }

    let file = FileBackend::new(dir.path()).file_for("settings");
    println!("\nOn disk ({}):", file.display());
    println!("   {}", std::fs::read_to_string(file)?);
    Ok(())
}
