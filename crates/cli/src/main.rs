use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use intelli_agents::{AgentError, AgentSettings, AssistantAgent, ChatInput};
use intelli_core::{
    follow_up_for_intent, rules_from_json, ConversationState, IntentTag, Link, RuleTable,
};
use intelli_observability::{init_tracing, AppMetrics};
use intelli_storage::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "intelliassist")]
#[command(about = "IntelliAssist campus assistant CLI")]
struct Cli {
    /// JSON rule table to use instead of the built-in one.
    #[arg(long, global = true, env = "INTELLI_RULES_PATH")]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Ask {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    Export,
    Check,
    /// Show one rule and the follow-up its intent adds, by intent code.
    Show { intent: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("intelli_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Chat => {
            let rules = load_rules(cli.rules.as_deref())?;
            run_chat(build_agent(rules)).await?;
        }
        Command::Ask { words, json } => {
            let text = words.join(" ");
            if text.trim().is_empty() {
                bail!("message is empty");
            }

            let rules = load_rules(cli.rules.as_deref())?;
            let outcome = rules.resolve_turn(&mut ConversationState::new(), &text);
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", render_reply(&outcome.reply.body, &outcome.reply.links));
            }
        }
        Command::Rules { command } => match command {
            RulesCommand::Export => {
                let rules = load_rules(cli.rules.as_deref())?;
                println!("{}", rules.to_json_pretty()?);
            }
            RulesCommand::Check => check_rules(cli.rules.as_deref())?,
            RulesCommand::Show { intent } => {
                let rules = load_rules(cli.rules.as_deref())?;
                println!("{}", describe_rule(&rules, &intent)?);
            }
        },
    }

    Ok(())
}

async fn run_chat(agent: AssistantAgent<MemoryStore>) -> Result<()> {
    let opened = agent.open_conversation().await?;
    let conversation_id = opened.conversation_id;

    println!("IntelliAssist chat mode. type 'exit' to quit.");
    println!("\n{}\n", render_reply(&opened.reply.body, &opened.reply.links));

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = match agent
            .handle_turn(ChatInput {
                conversation_id: Some(conversation_id.clone()),
                text: message.to_string(),
            })
            .await
        {
            Ok(reply) => reply,
            Err(AgentError::EmptyMessage) => continue,
            Err(err) => return Err(err.into()),
        };

        println!("\n{}\n", render_reply(&reply.body, &reply.links));
    }

    agent.end_conversation(&conversation_id).await?;
    Ok(())
}

fn check_rules(path: Option<&Path>) -> Result<()> {
    let table = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            RuleTable::new_unchecked_shadowing(rules_from_json(&raw)?)?
        }
        None => RuleTable::default_table(),
    };

    let shadowed = table.shadowed_keywords();
    for item in &shadowed {
        println!(
            "`{}` ({}) resolves to {}",
            item.keyword,
            item.owner.as_code(),
            item.shadowed_by.as_code()
        );
    }

    if !shadowed.is_empty() {
        bail!("{} shadowed keyword(s) in rule table", shadowed.len());
    }

    println!("{} rules, no shadowed keywords", table.len());
    Ok(())
}

fn describe_rule(table: &RuleTable, code: &str) -> Result<String> {
    let Some(intent) = IntentTag::parse(code) else {
        bail!("unknown intent `{code}`");
    };

    let mut out = format!("intent: {}", intent.as_code());
    match table.rules().iter().find(|rule| rule.intent == intent) {
        Some(rule) => {
            out.push_str(&format!("\npriority: {}", rule.priority));
            out.push_str(&format!("\nkeywords: {}", rule.keywords.join(", ")));
        }
        None if intent == IntentTag::Fallback => {
            out.push_str("\nmatched when no rule does");
        }
        None => out.push_str("\nnot in this rule table"),
    }

    let question = follow_up_for_intent(intent);
    if !question.is_empty() {
        out.push_str(&format!("\nfollow-up: {question}"));
    }
    Ok(out)
}

fn load_rules(path: Option<&Path>) -> Result<RuleTable> {
    match path {
        Some(path) => RuleTable::from_json_file(path)
            .with_context(|| format!("failed loading rule table from {}", path.display())),
        None => Ok(RuleTable::default_table()),
    }
}

fn build_agent(rules: RuleTable) -> AssistantAgent<MemoryStore> {
    AssistantAgent::new(
        Arc::new(rules),
        Arc::new(MemoryStore::new()),
        AppMetrics::shared(),
        AgentSettings::default(),
    )
}

/// Plain-text rendering; links go on their own lines after the body.
fn render_reply(body: &str, links: &[Link]) -> String {
    let mut out = body.to_string();
    for link in links {
        out.push_str(&format!("\n  {} <{}>", link.label, link.url));
    }
    out
}
