//! notegraph-cli: command-line client for the notegraph HTTP API
//!
//! # Subcommands
//! - `status`                                   server health
//! - `profiles`                                 named linking profiles
//! - `add <title> [content] [--file F]`         create a note (auto-links by default)
//! - `analyze <id> [--profile P]`               preview relationships
//! - `link <id> [--profile P]`                  create relationships
//! - `relationships <id>`                       list edges of a note
//! - `similar <id> [-n K]`                      embedding neighbours
//!
//! Every subcommand accepts `--json` to print the raw server response.

use clap::{Parser, Subcommand};
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";
const DEFAULT_TOP_K: usize = 5;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "notegraph-cli", version, about = "Notegraph relationship engine CLI")]
struct Cli {
    /// Notegraph HTTP server URL (overrides NOTEGRAPH_HTTP_URL env var)
    #[arg(long, env = "NOTEGRAPH_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// List linking profiles
    Profiles,

    /// Create a note
    Add {
        title: String,

        /// Note body; read from --file when omitted
        content: Option<String>,

        #[arg(long)]
        file: Option<std::path::PathBuf>,

        /// Skip automatic linking
        #[arg(long)]
        no_link: bool,

        #[arg(long)]
        profile: Option<String>,
    },

    /// Preview relationships for a note without writing them
    Analyze {
        id: String,

        #[arg(long)]
        profile: Option<String>,
    },

    /// Create relationships for a note
    Link {
        id: String,

        #[arg(long)]
        profile: Option<String>,
    },

    /// List a note's relationships
    Relationships { id: String },

    /// Notes nearest by embedding
    Similar {
        id: String,

        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

// ============================================================================
// HTTP Client
// ============================================================================

struct Api {
    base: String,
    client: reqwest::blocking::Client,
}

impl Api {
    fn new(base: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base, path);
        Self::finish(&url, self.client.get(&url).send())
    }

    fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base, path);
        Self::finish(&url, self.client.post(&url).json(&body).send())
    }

    fn finish(
        url: &str,
        resp: reqwest::Result<reqwest::blocking::Response>,
    ) -> anyhow::Result<Value> {
        let resp = resp.map_err(|e| anyhow::anyhow!("cannot reach {}: {}", url, e))?;
        let status = resp.status();
        let body: Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("no error message");
            anyhow::bail!("server returned {}: {}", status, msg);
        }
        Ok(body)
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// First 8 characters of an id, enough to tell notes apart on screen.
pub fn short_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}

fn num(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

pub fn format_analysis(body: &Value) -> String {
    let mut out = format!(
        "Profile {}: {} pairs, {} candidates ({} unrelated, {} manual, {} already linked, {} over cap)\n",
        body["profile"].as_str().unwrap_or("?"),
        body["pairs_evaluated"],
        body["total_candidates"],
        body["unrelated"],
        body["manual_overrides"],
        num(&body["already_linked"]),
        body["over_cap"],
    );
    if let Some(categories) = body["categories"].as_object() {
        for (category, items) in categories {
            out.push_str(&format!("\n[{}]\n", category));
            for c in items.as_array().into_iter().flatten() {
                out.push_str(&format!(
                    "  {:<22} {:.2}  {}  {}\n",
                    c["rel_type"].as_str().unwrap_or("?"),
                    num(&c["composite_score"]),
                    short_id(c["target_id"].as_str().unwrap_or("")),
                    c["target_title"].as_str().unwrap_or(""),
                ));
            }
        }
    }
    for f in body["failures"].as_array().into_iter().flatten() {
        out.push_str(&format!(
            "  ! skipped {}: {}\n",
            short_id(f["note_id"].as_str().unwrap_or("")),
            f["reason"].as_str().unwrap_or("")
        ));
    }
    out
}

pub fn format_link_report(body: &Value) -> String {
    let count = |k: &str| body[k].as_array().map(|a| a.len()).unwrap_or(0);
    let mut out = format!(
        "Created {}, skipped {}, failed {}\n",
        count("created"),
        count("skipped"),
        count("failed")
    );
    for e in body["created"].as_array().into_iter().flatten() {
        out.push_str(&format!(
            "  + {} -[{}]-> {}\n",
            short_id(e["source_id"].as_str().unwrap_or("")),
            e["rel_type"].as_str().unwrap_or("?"),
            short_id(e["target_id"].as_str().unwrap_or("")),
        ));
    }
    for f in body["failed"].as_array().into_iter().flatten() {
        out.push_str(&format!(
            "  ! {}: {}\n",
            f["kind"].as_str().unwrap_or("error"),
            f["message"].as_str().unwrap_or("")
        ));
    }
    out
}

pub fn format_relationships(body: &Value) -> String {
    let items = body["relationships"].as_array();
    if items.map(|a| a.is_empty()).unwrap_or(true) {
        return "No relationships\n".to_string();
    }
    let mut out = String::new();
    for r in items.into_iter().flatten() {
        let arrow = match (r["direction"].as_str(), r["bidirectional"].as_bool()) {
            (_, Some(true)) => "<->",
            (Some("incoming"), _) => "<-",
            _ => "->",
        };
        out.push_str(&format!(
            "{} {:<22} {} {} ({})\n",
            arrow,
            r["rel_type"].as_str().unwrap_or("?"),
            short_id(r["other_id"].as_str().unwrap_or("")),
            r["other_title"].as_str().unwrap_or(""),
            r["origin"].as_str().unwrap_or("?"),
        ));
    }
    out
}

pub fn format_similar(body: &Value) -> String {
    let mut out = String::new();
    for r in body["results"].as_array().into_iter().flatten() {
        out.push_str(&format!(
            "{:>5.1}%  {}  {}\n",
            num(&r["score"]) * 100.0,
            short_id(r["id"].as_str().unwrap_or("")),
            r["title"].as_str().unwrap_or(""),
        ));
    }
    if out.is_empty() {
        out.push_str("No similar notes\n");
    }
    out
}

fn format_profiles(body: &Value) -> String {
    let default = body["default"].as_str().unwrap_or("");
    let mut out = String::new();
    for p in body["profiles"].as_array().into_iter().flatten() {
        let name = p["name"].as_str().unwrap_or("?");
        let w = &p["weights"];
        out.push_str(&format!(
            "{}{:<18} sem {:.2} kw {:.2} struct {:.2} topic {:.2}  cap {}\n",
            if name == default { "* " } else { "  " },
            name,
            num(&w["semantic"]),
            num(&w["keyword"]),
            num(&w["structural"]),
            num(&w["topic"]),
            p["max_relationships_per_note"],
        ));
    }
    out
}

fn format_created(body: &Value) -> String {
    let mut out = format!(
        "Created {} (embedded: {})\n",
        body["note"]["id"].as_str().unwrap_or("?"),
        body["embedded"]
    );
    if body["link"].is_object() {
        out.push_str(&format_link_report(&body["link"]));
    }
    if let Some(err) = body["link_error"].as_str() {
        out.push_str(&format!("Linking failed: {}\n", err));
    }
    out
}

fn format_status(body: &Value) -> String {
    let mut out = format!(
        "Notegraph server: {}\nVersion:          {}\nStore:            {}\nEmbedder:         {}\n",
        body["status"].as_str().unwrap_or("unknown"),
        body["version"].as_str().unwrap_or("?"),
        body["store"].as_str().unwrap_or("?"),
        body["embedder"].as_str().unwrap_or("?"),
    );
    if let Some(pg) = body["postgresql"].as_str() {
        out.push_str(&format!("PostgreSQL:       {}\n", pg));
    }
    out
}

// ============================================================================
// Main
// ============================================================================

type Formatter = fn(&Value) -> String;

fn profile_body(profile: Option<String>) -> Value {
    serde_json::json!({ "profile": profile })
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let api = Api::new(&cli.server)?;

    let (body, formatter): (Value, Formatter) = match cli.command {
        Commands::Status => (api.get("/health")?, format_status),
        Commands::Profiles => (api.get("/profiles")?, format_profiles),
        Commands::Add {
            title,
            content,
            file,
            no_link,
            profile,
        } => {
            let content = match (content, file) {
                (Some(c), _) => c,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (None, None) => anyhow::bail!("provide content or --file"),
            };
            let body = api.post(
                "/notes",
                serde_json::json!({
                    "title": title,
                    "content": content,
                    "auto_link": !no_link,
                    "profile": profile,
                }),
            )?;
            (body, format_created)
        }
        Commands::Analyze { id, profile } => (
            api.post(&format!("/notes/{}/analyze", id), profile_body(profile))?,
            format_analysis,
        ),
        Commands::Link { id, profile } => (
            api.post(&format!("/notes/{}/link", id), profile_body(profile))?,
            format_link_report,
        ),
        Commands::Relationships { id } => (
            api.get(&format!("/notes/{}/relationships", id))?,
            format_relationships,
        ),
        Commands::Similar { id, top_k } => (
            api.get(&format!("/notes/{}/similar?top_k={}", id, top_k))?,
            format_similar,
        ),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", formatter(&body));
    }
    Ok(())
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("notegraph-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
