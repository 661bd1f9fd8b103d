//! The `examforge init` command.

use std::path::Path;

use anyhow::Result;

use examforge_core::config::STARTER_CONFIG;

pub fn execute() -> Result<()> {
    // Create examforge.toml
    if Path::new("examforge.toml").exists() {
        println!("examforge.toml already exists, skipping.");
    } else {
        std::fs::write("examforge.toml", STARTER_CONFIG)?;
        println!("Created examforge.toml");
    }

    // Create example blueprint
    std::fs::create_dir_all("blueprints")?;
    let example_path = Path::new("blueprints/example.json");
    if example_path.exists() {
        println!("blueprints/example.json already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BLUEPRINT)?;
        println!("Created blueprints/example.json");
    }

    println!("\nNext steps:");
    println!("  1. Put your question bank files in ./corpus");
    println!("  2. Run: examforge validate --blueprint blueprints/example.json");
    println!("  3. Run: examforge estimate --blueprint blueprints/example.json");
    println!("  4. Run: examforge generate --blueprint blueprints/example.json --count 5");

    Ok(())
}

const EXAMPLE_BLUEPRINT: &str = r#"{
  "test_id": "MOCK",
  "test_name": "Mock Test",
  "test_series": "Practice Series",
  "total_questions": 40,
  "total_marks": 40,
  "duration_minutes": 30,
  "sections": [
    {
      "section_id": "GA",
      "section_name": "General Awareness",
      "total_questions": 20,
      "source_files": ["general_awareness.json"],
      "difficulty_distribution": { "Easy": 6, "Medium": 10, "Hard": 4 },
      "topic_distribution": { "Banking": 8, "Economy": 7, "Current Affairs": 5 }
    },
    {
      "section_id": "QA",
      "section_name": "Quantitative Aptitude",
      "total_questions": 20,
      "source_files": ["quant.json", "data_interpretation.json"],
      "difficulty_distribution": { "Easy": 5, "Medium": 10, "Hard": 5 },
      "topic_distribution": { "Arithmetic": 10, "Data Interpretation": 2 }
    }
  ]
}
"#;
