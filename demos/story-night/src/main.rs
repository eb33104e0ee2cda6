//! Story Night: a ready-to-run Taleroom server with built-in content.
//!
//! ```text
//! story-night [--bind ADDR] [--config engine.json] [--content catalog.json]
//! ```
//!
//! Without `--content` the server plays a short castle story and a
//! five-question quiz.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;
use taleroom::prelude::*;

// ---------------------------------------------------------------------------
// Built-in content
// ---------------------------------------------------------------------------

fn builtin_catalog() -> Result<Catalog, serde_json::Error> {
    let heroes = json!(["wizard_1", "knight_1", "rogue_1", "bard_1"]);
    serde_json::from_value(json!({
        "characters": {
            "turn-based-story": heroes,
            "turn-based-quiz": heroes,
            "buzzer-quiz": heroes,
            "shared-lobby": ["explorer_1", "explorer_2", "explorer_3", "explorer_4"],
        },
        "questions": [
            { "id": "q-moons", "prompt": "How many moons does Mars have?",
              "options": ["None", "One", "Two", "Four"], "correct": 2 },
            { "id": "q-ocean", "prompt": "Which is the largest ocean?",
              "options": ["Atlantic", "Pacific", "Indian"], "correct": 1 },
            { "id": "q-hexagon", "prompt": "How many sides does a hexagon have?",
              "options": ["Five", "Six", "Eight"], "correct": 1 },
            { "id": "q-boil", "prompt": "Water boils at sea level at how many degrees Celsius?",
              "options": ["90", "100", "120"], "correct": 1 },
            { "id": "q-bee", "prompt": "How many legs does a bee have?",
              "options": ["Four", "Six", "Eight"], "correct": 1 },
        ],
        "story": [
            { "id": "gate", "prompt": "The castle gate is shut and the moat is wide.",
              "choices": ["Swim the moat", "Call for the gatekeeper"],
              "consequences": ["Cold water, but you reach the wall unseen.",
                               "A sleepy gatekeeper waves you through."] },
            { "id": "courtyard", "prompt": "Guards play dice in the courtyard.",
              "choices": ["Join the game", "Sneak along the wall"],
              "consequences": ["You win a key from a grumbling guard.",
                               "A loose stone clatters, but nobody looks up."] },
            { "id": "tower", "prompt": "A spiral staircase climbs into darkness.",
              "choices": ["Light a torch", "Feel your way up"],
              "consequences": ["The torch reveals a painted map of the keep.",
                               "You find a hidden door by touch."] },
            { "id": "throne", "prompt": "The throne room is empty. Almost.",
              "choices": ["Sit on the throne", "Bow to the empty seat"],
              "consequences": ["The castle cat claims the seat back.",
                               "A ghostly king nods in approval."] },
        ],
    }))
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "story-night", version, about = "Taleroom server with built-in story and quiz content")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "STORY_NIGHT_BIND", default_value = "0.0.0.0:8080")]
    bind: String,
    /// Engine settings as JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Character, question and story catalog as JSON.
    #[arg(long)]
    content: Option<PathBuf>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&text).map_err(|e| format!("invalid {}: {e}", path.display()))?)
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    taleroom::init_tracing();

    let args = Args::parse();
    let config: EngineConfig = match &args.config {
        Some(path) => read_json(path)?,
        None => EngineConfig::default(),
    };
    let catalog = match &args.content {
        Some(path) => read_json(path)?,
        None => builtin_catalog()?,
    };
    catalog.validate()?;

    tracing::info!(
        bind = %args.bind,
        questions = catalog.questions.len(),
        checkpoints = catalog.story.len(),
        "starting story-night"
    );

    let server = TaleroomServer::builder()
        .bind(&args.bind)
        .config(config)
        .content(catalog)
        .build()
        .await?;

    server.run().await?;
    Ok(())
}
