use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use remote_hotfix::applier::{self, ApplyStatus};
use remote_hotfix::config::{self, PatchDefinition, PatchSpec};
use remote_hotfix::remote::{FileStore, GithubStore, VersionToken};
use remote_hotfix::subst::SubstitutionSet;
use remote_hotfix::vcs::GitClone;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// How many near-miss lines to print when a patch finds nothing.
const CANDIDATE_LIMIT: usize = 5;

/// Pause between consecutive API writes so the store's commit graph keeps
/// up when a run touches many files.
const WRITE_PAUSE: Duration = Duration::from_millis(1000);

#[derive(Parser)]
#[command(name = "remote-hotfix")]
#[command(about = "Idempotent text patching for files behind a Git content API", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, patch, and publish the files named by a patch spec
    Apply {
        /// Specific spec file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        spec: Option<PathBuf>,

        /// Target repository as owner/name (overrides the spec's meta)
        #[arg(short, long)]
        repo: Option<String>,

        /// Branch to read and write (overrides the spec's meta)
        #[arg(short, long)]
        branch: Option<String>,

        /// API token (falls back to HOTFIX_TOKEN, then GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Evaluate and report without publishing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Patch files inside a local clone instead of publishing via the API
        #[arg(long)]
        clone: Option<PathBuf>,
    },

    /// Report patch status without writing anything
    Check {
        /// Specific spec file to check (otherwise checks all in patches/)
        #[arg(short, long)]
        spec: Option<PathBuf>,

        #[arg(short, long)]
        repo: Option<String>,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(long)]
        token: Option<String>,
    },

    /// Apply an ordered terminology rule file to one or more remote files
    Substitute {
        /// Rule file with ordered [[rules]] entries
        #[arg(long)]
        rules: PathBuf,

        #[arg(short, long)]
        repo: Option<String>,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(long)]
        token: Option<String>,

        /// Evaluate and report without publishing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Repository-relative files to rewrite
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Commit and push a prepared local clone
    Push {
        /// Clone directory
        #[arg(long, default_value = ".")]
        clone: PathBuf,

        /// Commit message
        #[arg(short, long)]
        message: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(long)]
        token: Option<String>,

        /// Commit identity as "Name <email>", configured before committing
        #[arg(long)]
        identity: Option<String>,
    },

    /// Append a timestamped deploy marker to a file to force a rebuild
    Trigger {
        /// Repository-relative file receiving the marker
        #[arg(short, long, default_value = "README.md")]
        file: String,

        #[arg(short, long)]
        repo: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(long)]
        token: Option<String>,

        /// Label embedded in the marker comment
        #[arg(long, default_value = "hotfix")]
        label: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            spec,
            repo,
            branch,
            token,
            dry_run,
            diff,
            clone,
        } => cmd_apply(spec, repo, branch, token, dry_run, diff, clone),

        Commands::Check {
            spec,
            repo,
            branch,
            token,
        } => cmd_apply(spec, repo, branch, token, true, false, None),

        Commands::Substitute {
            rules,
            repo,
            branch,
            token,
            dry_run,
            files,
        } => cmd_substitute(rules, repo, branch, token, dry_run, files),

        Commands::Push {
            clone,
            message,
            branch,
            token,
            identity,
        } => cmd_push(clone, message, branch, token, identity),

        Commands::Trigger {
            file,
            repo,
            branch,
            token,
            label,
        } => cmd_trigger(file, repo, branch, token, label),
    }
}

/// Helper: discover all .toml spec files in ./patches.
fn discover_spec_files() -> Result<Vec<PathBuf>> {
    let patches_dir = env::current_dir()?.join("patches");

    let mut files = Vec::new();
    if patches_dir.exists() {
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files.sort();

    if files.is_empty() {
        anyhow::bail!(
            "no .toml spec files found in {} (use --spec to name one)",
            patches_dir.display()
        );
    }

    Ok(files)
}

/// Helper: API token from flag or environment. Credentials never live in
/// spec files.
fn resolve_token(flag: Option<String>) -> Result<String> {
    if let Some(token) = flag {
        return Ok(token);
    }
    for var in ["HOTFIX_TOKEN", "GITHUB_TOKEN"] {
        if let Ok(token) = env::var(var) {
            if !token.is_empty() {
                return Ok(token);
            }
        }
    }
    anyhow::bail!("no API token: pass --token or set HOTFIX_TOKEN / GITHUB_TOKEN")
}

/// Helper: repository slug from flag or spec meta.
fn resolve_repo(flag: &Option<String>, spec: &PatchSpec) -> Result<String> {
    flag.clone()
        .or_else(|| spec.meta.repo.clone())
        .context("no target repository: pass --repo or set meta.repo in the spec")
}

fn resolve_branch(flag: &Option<String>, spec: &PatchSpec) -> String {
    flag.clone()
        .or_else(|| spec.meta.branch.clone())
        .unwrap_or_else(|| "main".to_string())
}

/// Helper: show unified diff between original and patched content.
fn display_diff(file: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {file} (original)").dimmed());
    println!("{}", format!("+++ {file} (patched)").dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => format!(" {change}").normal(),
        };
        print!("{sign}");
    }
    println!();
}

/// Where apply reads from and writes to: the content API or a local clone.
enum Target {
    Api(GithubStore),
    Clone(GitClone),
}

impl Target {
    fn read(&self, path: &str) -> Result<(String, Option<VersionToken>)> {
        match self {
            Target::Api(store) => {
                let doc = store
                    .fetch(path)
                    .with_context(|| format!("fetching {path} failed"))?;
                Ok((doc.content, Some(doc.token)))
            }
            Target::Clone(clone) => {
                let full = clone.root().join(path);
                let content = std::fs::read_to_string(&full)
                    .with_context(|| format!("reading {} failed", full.display()))?;
                Ok((content, None))
            }
        }
    }

    fn write(
        &self,
        path: &str,
        content: &str,
        token: Option<&VersionToken>,
        message: &str,
    ) -> Result<String> {
        match self {
            Target::Api(store) => {
                let token = token.context("missing version token for API write")?;
                let receipt = store
                    .publish(path, content, token, message)
                    .with_context(|| format!("publishing {path} failed"))?;
                Ok(receipt.commit)
            }
            Target::Clone(clone) => {
                let written = clone.write_file(path, content)?;
                Ok(written.display().to_string())
            }
        }
    }
}

fn cmd_apply(
    spec: Option<PathBuf>,
    repo: Option<String>,
    branch: Option<String>,
    token: Option<String>,
    dry_run: bool,
    show_diff: bool,
    clone: Option<PathBuf>,
) -> Result<()> {
    // 1. Determine spec files to load
    let spec_files = if let Some(path) = spec {
        vec![path]
    } else {
        discover_spec_files()?
    };

    let mut total_applied = 0;
    let mut total_already = 0;
    let mut total_failed = 0;

    // 2. Load and run each spec file
    for spec_file in spec_files {
        println!("Loading patches from {}...", spec_file.display());
        let spec = config::spec_from_path(&spec_file)?;

        let target = match &clone {
            Some(dir) => Target::Clone(GitClone::open(dir.clone())),
            None => {
                let repo = resolve_repo(&repo, &spec)?;
                let branch = resolve_branch(&branch, &spec);
                let token = resolve_token(token.clone())?;
                println!("Repository: {repo} (branch {branch})");
                Target::Api(GithubStore::new(&repo, &branch, &token)?)
            }
        };

        let message = spec
            .meta
            .message
            .clone()
            .unwrap_or_else(|| format!("fix: apply {}", spec.meta.name));

        if dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
        }

        // 3. Group patches by target file so each file is fetched once
        for file in spec.target_files() {
            let patches: Vec<&PatchDefinition> =
                spec.patches.iter().filter(|p| p.file == file).collect();

            let (original, version_token) = target.read(file)?;
            println!(
                "{}",
                format!("{} ({} bytes, {} patches)", file, original.len(), patches.len()).dimmed()
            );

            // 4. Fold the applier over this file's patches
            let mut text = original.clone();
            let mut file_failed = false;
            let mut file_changed = false;

            for patch in &patches {
                let outcome = applier::apply(&text, patch)
                    .with_context(|| format!("patch '{}' is invalid", patch.id))?;

                match outcome.status {
                    ApplyStatus::AppliedExact | ApplyStatus::AppliedHeuristic => {
                        let verb = if dry_run { "Would apply" } else { "Applied" };
                        println!(
                            "{} {}: {verb} ({})",
                            "✓".green(),
                            patch.id,
                            outcome.status
                        );
                        file_changed = true;
                        total_applied += 1;
                    }
                    ApplyStatus::AlreadyApplied => {
                        println!("{} {}: Already applied", "⊙".yellow(), patch.id);
                        total_already += 1;
                    }
                    ApplyStatus::NotFound => {
                        eprintln!("{} {}: Pattern not found in {file}", "✗".red(), patch.id);
                        let candidates =
                            applier::candidate_lines(&text, patch.probe(), CANDIDATE_LIMIT);
                        if !candidates.is_empty() {
                            eprintln!("  Closest lines:");
                            for (number, line) in candidates {
                                eprintln!("    {number:>5}: {line}");
                            }
                        }
                        file_failed = true;
                        total_failed += 1;
                    }
                }

                text = outcome.text;
            }

            if show_diff && text != original {
                display_diff(file, &original, &text);
            }

            // 5. Publish only fully-successful, changed files
            if file_failed {
                eprintln!("{}", format!("  {file}: not written (pattern failures)").red());
                continue;
            }
            if file_changed && !dry_run {
                let commit = target.write(file, &text, version_token.as_ref(), &message)?;
                println!("  {} {file} -> {commit}", "↑".green());
            }
        }
        println!();
    }

    // 6. Summary
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{total_applied}").green());
    println!("  {} already applied", format!("{total_already}").yellow());
    println!("  {} failed", format!("{total_failed}").red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_substitute(
    rules: PathBuf,
    repo: Option<String>,
    branch: Option<String>,
    token: Option<String>,
    dry_run: bool,
    files: Vec<String>,
) -> Result<()> {
    // 1. Load and compile the ordered rule list
    let rules_file = config::rules_from_path(&rules)?;
    let set = SubstitutionSet::compile(&rules_file.rules)?;
    println!(
        "Loaded {} rules from {}",
        set.len(),
        rules.display()
    );

    let repo = repo
        .or_else(|| rules_file.meta.repo.clone())
        .context("no target repository: pass --repo or set meta.repo in the rule file")?;
    let branch = branch
        .or_else(|| rules_file.meta.branch.clone())
        .unwrap_or_else(|| "main".to_string());
    let token = resolve_token(token)?;
    let message = rules_file
        .meta
        .message
        .clone()
        .unwrap_or_else(|| format!("chore: apply {} substitutions", rules_file.meta.name));

    let store = GithubStore::new(&repo, &branch, &token)?;
    println!("Repository: {repo} (branch {branch})");
    if dry_run {
        println!("{}", "  [DRY RUN - nothing will be written]".cyan());
    }

    // 2. Rewrite each document independently; only rule order matters
    let mut total_replacements = 0;
    let mut written = 0;

    for file in &files {
        let doc = store
            .fetch(file)
            .with_context(|| format!("fetching {file} failed"))?;
        let outcome = set.apply(&doc.content);

        if !outcome.changed() {
            println!("{} {file}: no occurrences", "⊙".yellow());
            continue;
        }

        println!(
            "{} {file}: {} replacements",
            "✓".green(),
            outcome.total()
        );
        total_replacements += outcome.total();

        if !dry_run {
            // Give the store a beat between writes; each publish creates a
            // commit on the same branch.
            if written > 0 {
                std::thread::sleep(WRITE_PAUSE);
            }
            let receipt = store
                .publish(file, &outcome.text, &doc.token, &message)
                .with_context(|| format!("publishing {file} failed"))?;
            println!("  {} {file} -> {}", "↑".green(), receipt.commit);
            written += 1;
        }
    }

    // 3. Summary
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} total replacements", format!("{total_replacements}").green());
    println!("  {} files written", format!("{written}").green());

    Ok(())
}

fn cmd_push(
    clone: PathBuf,
    message: String,
    branch: String,
    token: Option<String>,
    identity: Option<String>,
) -> Result<()> {
    let token = resolve_token(token)?;
    let clone = GitClone::open(clone);

    // 1. Optional commit identity
    if let Some(identity) = identity {
        let (name, email) = parse_identity(&identity)?;
        println!("Configuring identity {name} <{email}>...");
        clone.configure_identity(name, email)?;
    }

    println!("Repository: {}", clone.origin_slug()?);

    // 2. Make sure we are on the right branch and current with the remote
    println!("Checking out {branch}...");
    clone.checkout(&branch)?;
    clone.pull("origin", &branch)?;

    // 3. Commit pending changes, if any
    if clone.has_changes()? {
        println!("Committing changes...");
        clone.commit_all(&message)?;
    } else {
        println!("{}", "No uncommitted changes".yellow());
    }

    // 4. Push through the authenticated URL
    println!("Pushing {branch}...");
    clone.push_authenticated(&token, &branch)?;

    println!("{}", format!("Pushed {branch} successfully").green());
    Ok(())
}

fn cmd_trigger(
    file: String,
    repo: String,
    branch: String,
    token: Option<String>,
    label: String,
) -> Result<()> {
    let token = resolve_token(token)?;
    let store = GithubStore::new(&repo, &branch, &token)?;

    // Timestamp decoration lives here, outside the applier, so patch
    // application itself stays deterministic.
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let doc = store
        .fetch(&file)
        .with_context(|| format!("fetching {file} failed"))?;

    let mut content = doc.content.clone();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("<!-- deploy: {label} {timestamp} -->\n"));

    let receipt = store
        .publish(
            &file,
            &content,
            &doc.token,
            &format!("chore: trigger deployment ({label})"),
        )
        .with_context(|| format!("publishing {file} failed"))?;

    println!("{} deploy marker added to {file}", "✓".green());
    println!("  {} {file} -> {}", "↑".green(), receipt.commit);
    Ok(())
}

/// Parse "Name <email>" into its two halves.
fn parse_identity(identity: &str) -> Result<(&str, &str)> {
    let open = identity.find('<');
    let close = identity.rfind('>');
    match (open, close) {
        (Some(open), Some(close)) if open < close => {
            let name = identity[..open].trim();
            let email = identity[open + 1..close].trim();
            if name.is_empty() || email.is_empty() {
                anyhow::bail!("identity must look like \"Name <email>\", got: {identity}");
            }
            Ok((name, email))
        }
        _ => anyhow::bail!("identity must look like \"Name <email>\", got: {identity}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_identity_splits_name_and_email() {
        let (name, email) = parse_identity("Deploy Bot <deploy@example.com>").unwrap();
        assert_eq!(name, "Deploy Bot");
        assert_eq!(email, "deploy@example.com");
    }

    #[test]
    fn parse_identity_rejects_malformed() {
        assert!(parse_identity("just-a-name").is_err());
        assert!(parse_identity("<only@email>").is_err());
    }
}
