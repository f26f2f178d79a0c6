//! REPL session management

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use super::commands::parse_edit_command;
use crate::domain::{Role, StructuredPlan};
use crate::session::{PlanSession, PlanSource, SessionError, SessionEvent, SynthesisOutcome};

/// Interactive chat over a plan session
pub struct ReplSession {
    session: PlanSession,
    events: broadcast::Receiver<SessionEvent>,
}

impl ReplSession {
    /// Create a new REPL session
    pub fn new(session: PlanSession) -> Self {
        let events = session.subscribe();
        Self { session, events }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome().await;

        // Create readline editor for proper line editing
        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            self.report_events();

            let prompt = if self.session.is_editing().await {
                format!("{} ", "edit>".bright_magenta())
            } else {
                format!("{} ", ">".bright_green())
            };

            match rl.readline(&prompt) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.process_user_input(input).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C - just show new prompt
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D - exit
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        if self.session.is_synthesizing() {
            println!("{}", "Waiting for plan synthesis to finish...".dimmed());
        }
        self.session.settle().await;
        println!("Goodbye!");
        Ok(())
    }

    /// Print welcome message and the latest assistant turn
    async fn print_welcome(&self) {
        println!();
        println!("{}", "PlanSmith".bright_cyan().bold());
        println!("Session: {}", self.session.session_id());
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();

        let log = self.session.log().await;
        if let Some(turn) = log.all().last() {
            print_turn(turn.role, &turn.text);
        }
    }

    /// Print notices for background changes since the last prompt
    fn report_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::PlanChanged {
                    source: PlanSource::Synthesis,
                }) => {
                    println!("{}", "Plan updated from the conversation. /plan to view.".dimmed());
                }
                Ok(SessionEvent::SynthesisFinished(SynthesisOutcome::Discarded)) => {
                    println!("{}", "A plan update was dropped because you edited the plan.".dimmed());
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    /// Send a message and print the reply
    async fn process_user_input(&mut self, input: &str) {
        let reply = self.session.send_message(input).await;
        println!();
        print_turn(Role::Assistant, &reply);
    }

    /// Handle slash commands
    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let (cmd, args) = input.split_once(char::is_whitespace).unwrap_or((input, ""));

        match cmd {
            "/help" | "/h" => self.print_help(),
            "/quit" | "/q" | "/exit" => return SlashResult::Quit,
            "/plan" => self.print_plan().await,
            "/history" => self.print_history().await,
            "/status" => self.print_status().await,
            "/refresh" => {
                self.session.request_refresh().await;
                println!("{}", "Refreshing the plan in the background.".dimmed());
            }
            "/reset" => match self.session.reset_session().await {
                Ok(()) => {
                    println!("{}", "Session reset.".dimmed());
                    let log = self.session.log().await;
                    if let Some(turn) = log.all().first() {
                        print_turn(turn.role, &turn.text);
                    }
                }
                Err(e) => print_error(&e),
            },
            "/edit" => match self.session.open_edit().await {
                Ok(draft) => {
                    println!("{}", "Editing a copy of the plan. /commit to keep, /cancel to discard.".dimmed());
                    print_outline(&draft);
                }
                Err(e) => print_error(&e),
            },
            "/draft" => match self.session.edit_draft().await {
                Some(draft) => print_outline(&draft),
                None => print_error(&SessionError::NoOpenTransaction),
            },
            "/commit" => match self.session.commit_edit().await {
                Ok(_) => println!("{}", "Edit committed.".bright_green()),
                Err(e) => print_error(&e),
            },
            "/cancel" => match self.session.cancel_edit().await {
                Ok(()) => println!("{}", "Edit discarded.".dimmed()),
                Err(e) => print_error(&e),
            },
            "/set" | "/add" | "/update" | "/rm" | "/move" | "/section" | "/unsection" => {
                match parse_edit_command(cmd, args) {
                    Ok(edit) => match self.session.apply_edit(edit).await {
                        Ok(draft) => print_outline(&draft),
                        Err(e) => print_error(&e),
                    },
                    Err(msg) => println!("{} {}", "?".yellow(), msg),
                }
            }
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
            }
        }
        SlashResult::Continue
    }

    /// Print help message
    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:34} Show this help", "/help".yellow());
        println!("  {:34} Exit", "/quit".yellow());
        println!("  {:34} Show the current plan", "/plan".yellow());
        println!("  {:34} Show the conversation", "/history".yellow());
        println!("  {:34} Show session status", "/status".yellow());
        println!("  {:34} Re-synthesize the plan now", "/refresh".yellow());
        println!("  {:34} Start over", "/reset".yellow());
        println!();
        println!("{}", "Editing:".bright_cyan());
        println!("  {:34} Open an edit of the plan", "/edit".yellow());
        println!("  {:34} Show the edit copy", "/draft".yellow());
        println!("  {:34} Keep the edit", "/commit".yellow());
        println!("  {:34} Discard the edit", "/cancel".yellow());
        println!("  {:34} Set title or summary", "/set title|summary <text>".yellow());
        println!("  {:34} Rename a section entry", "/set feature|task|risk <n> <text>".yellow());
        println!("  {:34} Set a risk mitigation", "/set mitigation <n> <text>".yellow());
        println!(
            "  {:34} Edit a milestone",
            "/set milestone <n> name|deadline|description <text>".yellow()
        );
        println!("  {:34} Append an empty item", "/add <list>".yellow());
        println!("  {:34} Replace an item", "/update <list> <n> <text>".yellow());
        println!("  {:34} Remove an item", "/rm <list> <n>".yellow());
        println!("  {:34} Reorder an item", "/move <list> <from> <to>".yellow());
        println!("  {:34} Add a section entry", "/section <section>".yellow());
        println!("  {:34} Remove a section entry", "/unsection <section> <n>".yellow());
        println!();
        println!(
            "  Lists: objectives success-criteria included excluded tools people materials next-steps feature:<n> task:<n>"
        );
        println!("  Sections: features milestones tasks risks");
        println!();
    }

    async fn print_plan(&self) {
        match self.session.current_plan().await {
            Some(plan) => {
                println!();
                println!("{}", plan.to_markdown());
            }
            None if self.session.is_synthesizing() => {
                println!("{}", "The plan is being synthesized. Try again in a moment.".dimmed())
            }
            None => println!("{}", "No plan yet. Keep chatting, or /refresh.".dimmed()),
        }
    }

    /// Print conversation history
    async fn print_history(&self) {
        let log = self.session.log().await;
        println!();
        println!("{}", "Conversation History:".bright_cyan());
        for (i, turn) in log.all().iter().enumerate() {
            let role = match turn.role {
                Role::User => "User".bright_green(),
                Role::Assistant => "Assistant".bright_blue(),
            };
            let preview: String = turn.text.chars().take(60).collect();
            let preview = if turn.text.chars().count() > 60 {
                format!("{}...", preview)
            } else {
                preview
            };
            println!("  {}. {}: {}", i + 1, role, preview);
        }
        println!();
    }

    async fn print_status(&self) {
        let status = self.session.status().await;
        println!();
        println!("{}", "Session Status:".bright_cyan());
        println!("  Session:       {}", status.session_id);
        println!("  Turns:         {}", status.turns);
        println!("  Plan:          {}", if status.has_plan { "yes" } else { "no" });
        println!("  Synthesizing:  {}", status.synthesizing);
        println!("  Editing:       {}", status.editing);
        if status.edit_stale {
            println!(
                "  {}",
                "The plan was re-synthesized since this edit opened; committing will replace it.".yellow()
            );
        }
        println!();
    }
}

fn print_turn(role: Role, text: &str) {
    match role {
        Role::Assistant => println!("{} {}", "PlanSmith:".bright_blue().bold(), text),
        Role::User => println!("{} {}", "You:".bright_green().bold(), text),
    }
    println!();
}

fn print_error(err: &SessionError) {
    println!("{} {}", "Error:".red(), err);
}

/// Numbered outline of the plan, the positions edit commands refer to
fn print_outline(plan: &StructuredPlan) {
    println!();
    println!("{} {}", "Title:".bright_cyan(), plan.title);
    println!("{} {}", "Summary:".bright_cyan(), plan.overview.summary);
    print_numbered("objectives", &plan.overview.objectives);
    print_numbered("success-criteria", &plan.overview.success_criteria);

    println!("{}", "features".bright_cyan());
    for (i, group) in plan.features.iter().enumerate() {
        println!("  {}. {}", i + 1, group.category.bold());
        for (j, item) in group.items.iter().enumerate() {
            println!("     {}. {}", j + 1, item);
        }
    }

    print_numbered("included", &plan.scope.included);
    print_numbered("excluded", &plan.scope.excluded);

    println!("{}", "milestones".bright_cyan());
    for (i, m) in plan.timeline.milestones.iter().enumerate() {
        println!(
            "  {}. {} [{}] {}",
            i + 1,
            m.name,
            m.deadline.as_deref().unwrap_or("-"),
            m.description.as_deref().unwrap_or("")
        );
    }

    println!("{}", "tasks".bright_cyan());
    for (i, phase) in plan.tasks.iter().enumerate() {
        println!("  {}. {}", i + 1, phase.phase.bold());
        for (j, item) in phase.items.iter().enumerate() {
            println!("     {}. {}", j + 1, item);
        }
    }

    print_numbered("tools", &plan.resources.tools);
    print_numbered("people", &plan.resources.people);
    print_numbered("materials", &plan.resources.materials);

    println!("{}", "risks".bright_cyan());
    for (i, r) in plan.risks.iter().enumerate() {
        println!("  {}. {} (mitigation: {})", i + 1, r.risk, r.mitigation.as_deref().unwrap_or("-"));
    }

    print_numbered("next-steps", &plan.next_steps);
    println!();
}

fn print_numbered(name: &str, items: &[String]) {
    println!("{}", name.bright_cyan());
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }
}

/// Result of handling a slash command
enum SlashResult {
    Continue,
    Quit,
}
