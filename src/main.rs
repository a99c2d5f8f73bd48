mod take;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

use milestones::config::{self, Config, ACTOR_ENV, ROLE_ENV};
use milestones::models::{
    Actor, Category, JsonOutput, QuestionDraft, RecommendationDraft, RecommendationStatus, Role,
    ScoreRange, TestDraft, TestResult, TestUpdate, Urgency,
};
use milestones::recommend::{validate_ranges, RangeWarning};
use milestones::{Database, Orchestrator};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Parser)]
#[command(name = "milestones")]
#[command(about = "Developmental milestone tests: authoring, test sessions and results")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Id of the acting user
    #[arg(long, global = true, env = ACTOR_ENV, default_value = "local")]
    actor: String,

    /// Role of the acting user: parent/admin
    #[arg(long, global = true, env = ROLE_ENV, default_value = "parent")]
    role: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage your children
    #[command(subcommand)]
    Child(ChildCommands),

    /// Manage test templates
    #[command(subcommand)]
    Test(TestCommands),

    /// Manage the questions of a test (admin)
    #[command(subcommand)]
    Question(QuestionCommands),

    /// Manage the recommendations of a test (admin)
    #[command(subcommand)]
    Rec(RecCommands),

    /// Take a test for a child
    Take {
        /// Test ID
        test_id: String,

        /// Child ID
        #[arg(long, short)]
        child: String,

        /// Comma-separated option numbers (0-based) in question order; '-' skips.
        /// Without this the test runs interactively.
        #[arg(long, short)]
        answers: Option<String>,
    },

    /// List test results, newest first
    Results {
        /// Only this child's results
        #[arg(long, short)]
        child: Option<String>,
    },

    /// Show the most recent result
    Latest {
        /// Only this child's results
        #[arg(long, short)]
        child: Option<String>,
    },

    /// Show a result with per-category detail
    Report {
        /// Result ID
        id: String,
    },

    /// Suggest the test matching a child's age
    Suggest {
        /// Child ID
        #[arg(long, short)]
        child: String,
    },
}

#[derive(Subcommand)]
enum ChildCommands {
    /// Register a child
    Add {
        /// Child's name
        name: String,

        /// Birth date (YYYY-MM-DD)
        #[arg(long, short)]
        born: String,
    },

    /// List your children
    List,
}

#[derive(Subcommand)]
enum TestCommands {
    /// List active tests by target age
    List {
        /// Include deactivated tests (admin)
        #[arg(long, short)]
        all: bool,
    },

    /// Show a test with its questions and recommendations
    Show {
        /// Test ID
        id: String,
    },

    /// Create an empty test
    Create {
        /// Test title
        #[arg(long, short)]
        title: String,

        /// Target age in months
        #[arg(long, short)]
        age: u32,

        /// Test description
        #[arg(long, short)]
        description: Option<String>,
    },

    /// Create a test from a JSON file
    Import {
        /// Path to the test document
        file: PathBuf,
    },

    /// Update test fields
    Update {
        /// Test ID
        id: String,

        #[arg(long, short)]
        title: Option<String>,

        #[arg(long, short)]
        age: Option<u32>,

        #[arg(long, short)]
        description: Option<String>,

        /// Activate or deactivate
        #[arg(long)]
        active: Option<bool>,
    },

    /// Deactivate a test
    Delete {
        /// Test ID
        id: String,
    },
}

#[derive(Subcommand)]
enum QuestionCommands {
    /// Append a question to a test
    Add {
        /// Test ID
        test_id: String,

        /// Question text
        #[arg(long, short)]
        text: String,

        /// physical/cognitive/emotional/social/language
        #[arg(long, short)]
        category: String,

        /// Comma-separated answer options
        #[arg(long, short)]
        options: String,

        /// Index (0-based) of the expected option
        #[arg(long, short)]
        expected: usize,

        #[arg(long, short)]
        weight: Option<u32>,
    },

    /// Remove a question from a test
    Remove {
        /// Test ID
        test_id: String,

        /// Question ID
        question_id: String,
    },
}

#[derive(Subcommand)]
enum RecCommands {
    /// Append a recommendation to a test
    Add {
        /// Test ID
        test_id: String,

        /// Lowest score (inclusive)
        #[arg(long)]
        min: u32,

        /// Highest score (inclusive)
        #[arg(long)]
        max: u32,

        /// excellent/good/needs_attention/consult_doctor
        #[arg(long, short)]
        status: String,

        #[arg(long, short)]
        title: String,

        #[arg(long, short)]
        message: String,

        /// A tip (repeatable)
        #[arg(long = "tip")]
        tips: Vec<String>,

        /// A next step (repeatable)
        #[arg(long = "next-step")]
        next_steps: Vec<String>,

        /// low/medium/high
        #[arg(long, short, default_value = "low")]
        urgency: String,
    },

    /// Remove a recommendation from a test
    Remove {
        /// Test ID
        test_id: String,

        /// Recommendation ID
        rec_id: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();
    config::init_logging(&config);

    let json = cli.json;
    if let Err(e) = run(cli, &config) {
        if json {
            println!(
                "{}",
                serde_json::to_string(&JsonOutput::<()>::err(e.to_string()))
                    .unwrap_or_default()
            );
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn parse_actor(cli: &Cli) -> Result<Actor, String> {
    let role = Role::from_str(&cli.role)
        .ok_or_else(|| format!("Invalid role '{}'. Use: parent, admin", cli.role))?;
    Ok(Actor {
        id: cli.actor.clone(),
        role,
    })
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD", s))
}

fn parse_picks(s: &str) -> Result<Vec<Option<usize>>, String> {
    s.split(',')
        .map(str::trim)
        .map(|p| match p {
            "-" | "" => Ok(None),
            _ => p
                .parse::<usize>()
                .map(Some)
                .map_err(|_| format!("Invalid answer '{}'", p)),
        })
        .collect()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn print_json<T: serde::Serialize>(data: T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn print_warnings(warnings: &[RangeWarning]) {
    for warning in warnings {
        println!("Warning: {}", warning);
    }
}

fn print_result(result: &TestResult) {
    let rec = &result.recommendation;
    println!("=== Result {} ===", result.id);
    println!(
        "Score: {}% ({}/{} correct)",
        result.score, result.correct_answers, result.total_questions
    );
    println!("Status: {} (urgency: {})", rec.status.label(), rec.urgency.label());
    println!();
    println!("{}", rec.title);
    println!("{}", rec.message);
    if !rec.tips.is_empty() {
        println!();
        println!("Tips:");
        for tip in &rec.tips {
            println!("  - {}", tip);
        }
    }
    if let Some(steps) = &rec.next_steps {
        println!();
        println!("Next steps:");
        for step in steps {
            println!("  - {}", step);
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn run(cli: Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let actor = parse_actor(&cli)?;
    let db = Database::open(&config.db_path)?;
    db.init()?;

    let mut app = Orchestrator::new(db, actor);
    app.refresh_tests()?;

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(())?;
            } else {
                println!("Database initialized at: {}", config.db_path.display());
            }
        }

        Commands::Child(child_cmd) => match child_cmd {
            ChildCommands::Add { name, born } => {
                let child = app.add_child(&name, parse_date(&born)?)?;
                if cli.json {
                    print_json(&child)?;
                } else {
                    println!("Added child '{}' with ID: {}", child.name, child.id);
                }
            }

            ChildCommands::List => {
                let children = app.children()?;
                let today = Utc::now().date_naive();
                if cli.json {
                    print_json(&children)?;
                } else if children.is_empty() {
                    println!("No children registered.");
                } else {
                    println!("{:<22} {:<25} {:<12} AGE", "ID", "NAME", "BORN");
                    println!("{}", "-".repeat(70));
                    for child in children {
                        println!(
                            "{:<22} {:<25} {:<12} {} months",
                            child.id,
                            truncate(&child.name, 23),
                            child.birth_date.format(DATE_FORMAT),
                            child.age_in_months(today)
                        );
                    }
                }
            }
        },

        Commands::Test(test_cmd) => match test_cmd {
            TestCommands::List { all } => {
                let tests = if all {
                    app.all_tests()?
                } else {
                    app.active_tests().to_vec()
                };
                if cli.json {
                    print_json(&tests)?;
                } else if tests.is_empty() {
                    println!("No tests found.");
                } else {
                    println!("{:<22} {:<5} {:<40} QUESTIONS", "ID", "AGE", "TITLE");
                    println!("{}", "-".repeat(80));
                    for test in tests {
                        let inactive = if test.is_active { "" } else { " (inactive)" };
                        println!(
                            "{:<22} {:<5} {:<40} {}{}",
                            test.id,
                            test.age_in_months,
                            truncate(&test.title, 38),
                            test.question_count(),
                            inactive
                        );
                    }
                }
            }

            TestCommands::Show { id } => {
                let test = app
                    .find_test(&id)?
                    .ok_or_else(|| format!("Test not found: {}", id))?;
                let warnings = validate_ranges(&test.recommendations);
                if cli.json {
                    print_json(serde_json::json!({
                        "test": test,
                        "warnings": warnings
                    }))?;
                } else {
                    println!("Test: {}", test.title);
                    println!("ID: {}", test.id);
                    println!("Target age: {} months", test.age_in_months);
                    if !test.description.is_empty() {
                        println!("Description: {}", test.description);
                    }
                    println!("Active: {}", if test.is_active { "yes" } else { "no" });

                    println!();
                    println!("--- Questions ---");
                    for (i, q) in test.questions.iter().enumerate() {
                        println!(
                            "{}. [{}] {} ({})",
                            i + 1,
                            q.category.label(),
                            q.text,
                            q.id
                        );
                        for (j, option) in q.options.iter().enumerate() {
                            let marker = if j == q.expected_answer_index { "*" } else { " " };
                            println!("    {}{}: {}", marker, j, option);
                        }
                    }

                    println!();
                    println!("--- Recommendations ---");
                    for rec in &test.recommendations {
                        println!(
                            "{:>3}-{:<3} {:<16} {} ({})",
                            rec.score_range.min,
                            rec.score_range.max,
                            rec.status.label(),
                            rec.title,
                            rec.id
                        );
                    }
                    print_warnings(&warnings);
                }
            }

            TestCommands::Create {
                title,
                age,
                description,
            } => {
                let authored = app.create_test(TestDraft {
                    age_in_months: age,
                    title,
                    description: description.unwrap_or_default(),
                    questions: vec![],
                    recommendations: vec![],
                })?;
                if cli.json {
                    print_json(&authored)?;
                } else {
                    println!(
                        "Created test '{}' with ID: {}",
                        authored.item.title, authored.item.id
                    );
                    print_warnings(&authored.warnings);
                }
            }

            TestCommands::Import { file } => {
                let contents = std::fs::read_to_string(&file)?;
                let draft: TestDraft = serde_json::from_str(&contents)?;
                let authored = app.create_test(draft)?;
                if cli.json {
                    print_json(&authored)?;
                } else {
                    println!(
                        "Imported test '{}' ({} questions, {} recommendations) with ID: {}",
                        authored.item.title,
                        authored.item.questions.len(),
                        authored.item.recommendations.len(),
                        authored.item.id
                    );
                    print_warnings(&authored.warnings);
                }
            }

            TestCommands::Update {
                id,
                title,
                age,
                description,
                active,
            } => {
                let update = TestUpdate {
                    title,
                    description,
                    age_in_months: age,
                    is_active: active,
                };
                if update.is_empty() {
                    return Err("Nothing to update".into());
                }
                let test = app.update_test(&id, update)?;
                if cli.json {
                    print_json(&test)?;
                } else {
                    println!("Updated test {}.", test.id);
                }
            }

            TestCommands::Delete { id } => {
                app.delete_test(&id)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Test {} deactivated.", id);
                }
            }
        },

        Commands::Question(question_cmd) => match question_cmd {
            QuestionCommands::Add {
                test_id,
                text,
                category,
                options,
                expected,
                weight,
            } => {
                let category = Category::from_str(&category).ok_or_else(|| {
                    format!(
                        "Invalid category '{}'. Use: physical, cognitive, emotional, social, language",
                        category
                    )
                })?;
                let question = app.add_question(
                    &test_id,
                    QuestionDraft {
                        text,
                        category,
                        options: split_list(&options),
                        expected_answer_index: expected,
                        weight,
                    },
                )?;
                if cli.json {
                    print_json(&question)?;
                } else {
                    println!("Added question with ID: {}", question.id);
                }
            }

            QuestionCommands::Remove {
                test_id,
                question_id,
            } => {
                app.remove_question(&test_id, &question_id)?;
                if cli.json {
                    print_json(())?;
                } else {
                    println!("Question {} removed.", question_id);
                }
            }
        },

        Commands::Rec(rec_cmd) => match rec_cmd {
            RecCommands::Add {
                test_id,
                min,
                max,
                status,
                title,
                message,
                tips,
                next_steps,
                urgency,
            } => {
                let status = RecommendationStatus::from_str(&status).ok_or_else(|| {
                    format!(
                        "Invalid status '{}'. Use: excellent, good, needs_attention, consult_doctor",
                        status
                    )
                })?;
                let urgency = Urgency::from_str(&urgency)
                    .ok_or_else(|| format!("Invalid urgency '{}'. Use: low, medium, high", urgency))?;
                let authored = app.add_recommendation(
                    &test_id,
                    RecommendationDraft {
                        score_range: ScoreRange::new(min, max),
                        status,
                        title,
                        message,
                        tips,
                        next_steps: if next_steps.is_empty() {
                            None
                        } else {
                            Some(next_steps)
                        },
                        urgency,
                    },
                )?;
                if cli.json {
                    print_json(&authored)?;
                } else {
                    println!("Added recommendation with ID: {}", authored.item.id);
                    print_warnings(&authored.warnings);
                }
            }

            RecCommands::Remove { test_id, rec_id } => {
                let warnings = app.remove_recommendation(&test_id, &rec_id)?;
                if cli.json {
                    print_json(serde_json::json!({ "warnings": warnings }))?;
                } else {
                    println!("Recommendation {} removed.", rec_id);
                    print_warnings(&warnings);
                }
            }
        },

        Commands::Take {
            test_id,
            child,
            answers,
        } => {
            let result = match answers {
                Some(answers) => Some(take::take_with_answers(
                    &mut app,
                    &test_id,
                    &child,
                    &parse_picks(&answers)?,
                )?),
                None => take::take_interactive(
                    &mut app,
                    &test_id,
                    &child,
                    io::stdin().lock(),
                    io::stdout(),
                )?,
            };

            match result {
                Some(result) if cli.json => print_json(&result)?,
                Some(result) => {
                    println!();
                    print_result(&result);
                }
                None if cli.json => print_json(())?,
                None => println!("Test abandoned; nothing was saved."),
            }
        }

        Commands::Results { child } => {
            let results = app.results(child.as_deref())?;
            if cli.json {
                print_json(&results)?;
            } else if results.is_empty() {
                println!("No results yet.");
            } else {
                println!(
                    "{:<22} {:<22} {:<5} {:<6} {:<16} COMPLETED",
                    "ID", "CHILD", "AGE", "SCORE", "STATUS"
                );
                println!("{}", "-".repeat(100));
                for r in results {
                    println!(
                        "{:<22} {:<22} {:<5} {:<6} {:<16} {}",
                        r.id,
                        r.child_id,
                        r.age_in_months,
                        format!("{}%", r.score),
                        r.recommendation.status.label(),
                        r.completed_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Commands::Latest { child } => match app.latest_result(child.as_deref())? {
            Some(result) if cli.json => print_json(&result)?,
            Some(result) => print_result(&result),
            None if cli.json => print_json(())?,
            None => println!("No results yet."),
        },

        Commands::Report { id } => {
            let report = app.result_report(&id)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("=== {} ===", report.test_title);
                println!(
                    "Score: {}% ({}/{} correct) - {}",
                    report.score, report.correct_answers, report.total_questions, report.status
                );
                println!("Completed: {}", report.completed_at.format("%Y-%m-%d %H:%M"));

                if !report.categories.is_empty() {
                    println!();
                    println!("--- By category ---");
                    for c in &report.categories {
                        println!("{} {:<10} {}/{}", c.icon, c.label, c.correct, c.total);
                    }
                }

                println!();
                println!("--- Answers ---");
                for a in &report.answers {
                    println!(
                        "[{}] {} ({}): {}",
                        if a.is_correct { "x" } else { " " },
                        a.question,
                        a.category,
                        a.selected
                    );
                }

                println!();
                println!("{}", report.recommendation.title);
                println!("{}", report.recommendation.message);
            }
        }

        Commands::Suggest { child } => {
            let today = Utc::now().date_naive();
            match app.suggested_test(&child, today)? {
                Some(test) if cli.json => print_json(test)?,
                Some(test) => println!(
                    "Suggested: {} ({} months) - ID: {}",
                    test.title, test.age_in_months, test.id
                ),
                None if cli.json => print_json(())?,
                None => println!("No tests available."),
            }
        }
    }

    Ok(())
}
