//! Educational ransomware simulation: creates sample files inside the
//! monitored tree, "transforms" them by appending a demo extension, and
//! drops an explanatory note. No content is ever encrypted; the point is to
//! drive the real detection pipeline with realistic activity.

use crate::logging::{DetectorLog, LogLevel};
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SAMPLE_COUNT: usize = 3;
const EXAMPLE_PAIRS: usize = 2;
const NOTE_FILE: &str = "EDUCATIONAL_RANSOMWARE_INFO.txt";

#[derive(Debug, Clone, serde::Serialize)]
pub struct SimulationSummary {
    pub sample_files: usize,
    pub transformed_files: usize,
    pub note_path: Option<String>,
}

/// Run the whole simulation synchronously; callers put this on a blocking
/// task. Every step is logged to the simulation log in the standard line
/// grammar.
pub fn run_simulation(directory: &Path, log: &DetectorLog) -> std::io::Result<SimulationSummary> {
    log.log(LogLevel::Info, "Starting educational ransomware simulation...");
    std::fs::create_dir_all(directory)?;

    let samples = create_benign_files(directory, log)?;
    std::thread::sleep(Duration::from_millis(500));

    for i in 0..EXAMPLE_PAIRS {
        write_demo_file(&directory.join(format!("benign_example_{i}.txt")), false, log)?;
        write_demo_file(&directory.join(format!("malicious_example_{i}.txt")), true, log)?;
        std::thread::sleep(Duration::from_millis(250));
    }

    let mut transformed = 0;
    for path in &samples {
        std::thread::sleep(Duration::from_millis(250));
        if transform_file(path, log).is_some() {
            transformed += 1;
        }
    }

    let note = create_note(directory, log).ok();

    log.log(LogLevel::Info, "Educational simulation completed.");
    Ok(SimulationSummary {
        sample_files: samples.len(),
        transformed_files: transformed,
        note_path: note.map(|p| p.display().to_string()),
    })
}

fn create_benign_files(directory: &Path, log: &DetectorLog) -> std::io::Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    for i in 0..SAMPLE_COUNT {
        let path = directory.join(format!("sample_document_{i}.txt"));
        let mut f = std::fs::File::create(&path)?;
        writeln!(f, "This is a sample document {i}.")?;
        writeln!(f, "It contains example text that represents user data.")?;
        writeln!(f, "In a real ransomware attack, files like this would be encrypted.")?;
        writeln!(f, "Created on: {stamp}")?;
        log.log(
            LogLevel::Info,
            &format!("Created sample text file: {}", path.display()),
        );
        created.push(path);
    }

    let config = directory.join("sample_config.ini");
    let mut f = std::fs::File::create(&config)?;
    writeln!(f, "[Settings]")?;
    writeln!(f, "theme=default")?;
    writeln!(f, "autoSave=true")?;
    writeln!(f, "interval=300")?;
    writeln!(f)?;
    writeln!(f, "[User]")?;
    writeln!(f, "name=SampleUser")?;
    writeln!(f, "lastLogin={stamp}")?;
    log.log(
        LogLevel::Info,
        &format!("Created sample config file: {}", config.display()),
    );
    created.push(config);

    Ok(created)
}

fn write_demo_file(path: &Path, malicious: bool, log: &DetectorLog) -> std::io::Result<()> {
    let mut f = std::fs::File::create(path)?;
    writeln!(f, "EDUCATIONAL DEMO FILE - NOT ACTUAL MALWARE")?;
    writeln!(f, "{}", "=".repeat(50))?;
    writeln!(f)?;
    if malicious {
        writeln!(f, "[This file represents what malware might look like]")?;
        writeln!(f, "Typical traits: missing debug info, odd version numbers,")?;
        writeln!(f, "oversized export tables, unusual section layouts.")?;
    } else {
        writeln!(f, "[This file represents a benign executable]")?;
        writeln!(f, "Typical traits: proper debug info, standard versions,")?;
        writeln!(f, "normal export tables, typical section counts.")?;
    }
    writeln!(f)?;
    writeln!(f, "Created: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(f, "Educational purposes only.")?;
    log.log(
        LogLevel::Info,
        &format!(
            "Created {} demo file: {}",
            if malicious { "simulation malicious" } else { "benign" },
            path.display()
        ),
    );
    Ok(())
}

/// "Transform" a file the way ransomware would, minus the encryption: the
/// content is copied into a `.demo` sibling with a banner, preserving the
/// original.
fn transform_file(path: &Path, log: &DetectorLog) -> Option<PathBuf> {
    let content = std::fs::read_to_string(path).ok()?;
    let new_path = PathBuf::from(format!("{}.demo", path.display()));
    let mut f = std::fs::File::create(&new_path).ok()?;
    let header = format!(
        "EDUCATIONAL SIMULATION - TRANSFORMED FILE\n{}\n\n\
         Original content would be inaccessible in real ransomware.\n\
         Original filename: {}\n\
         Transformed: {}\n\n\
         ORIGINAL CONTENT PRESERVED FOR EDUCATIONAL PURPOSES:\n{}\n",
        "=".repeat(50),
        path.file_name()?.to_string_lossy(),
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        "-".repeat(50),
    );
    f.write_all(header.as_bytes()).ok()?;
    f.write_all(content.as_bytes()).ok()?;
    log.log(
        LogLevel::Info,
        &format!(
            "Simulated transformation on: {} -> {}",
            path.display(),
            new_path.display()
        ),
    );
    Some(new_path)
}

fn create_note(directory: &Path, log: &DetectorLog) -> std::io::Result<PathBuf> {
    let path = directory.join(NOTE_FILE);
    let mut f = std::fs::File::create(&path)?;
    writeln!(f, "EDUCATIONAL INFORMATION ABOUT RANSOMWARE")?;
    writeln!(f, "{}", "=".repeat(38))?;
    writeln!(f)?;
    writeln!(f, "This is an educational simulation that demonstrates how ransomware operates.")?;
    writeln!(f, "NO ACTUAL ENCRYPTION OR HARMFUL ACTIONS WERE PERFORMED.")?;
    writeln!(f)?;
    writeln!(f, "In a real attack files would be encrypted with strong cryptography,")?;
    writeln!(f, "originals would be inaccessible without a key, and a ransom note")?;
    writeln!(f, "would demand payment.")?;
    writeln!(f)?;
    writeln!(f, "Protection: keep offline backups, patch systems, use reputable")?;
    writeln!(f, "security software, be cautious with attachments, and keep an")?;
    writeln!(f, "incident response plan ready.")?;
    writeln!(f)?;
    writeln!(f, "Created: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    log.log(
        LogLevel::Info,
        &format!("Educational note created: {}", path.display()),
    );
    Ok(path)
}
