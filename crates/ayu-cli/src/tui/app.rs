//! TUI application state.
//!
//! The session is written by the dispatch task and read here; the app only
//! keeps a cached row list that is rebuilt whenever the session revision or
//! the filter changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use ayu_core::runner::{RunOutput, RunnerCommand, Selection, TestRunner};
use ayu_core::session::SharedSession;
use ayu_core::tree::{NodeId, Row, TreeFilter};

use crate::config::RunnerSection;

/// Which view the TUI is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Tree,
    Coverage,
    Log,
    Help,
}

/// Line being typed after `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchInput {
    pub query: String,
}

/// A run in flight on its own task.
pub struct ActiveRun {
    pub label: &'static str,
    pub command: String,
    task: JoinHandle<Result<RunOutput>>,
}

/// Application state for the TUI.
pub struct App {
    pub session: SharedSession,
    runner: Arc<dyn TestRunner>,
    runner_config: RunnerSection,
    tests_path: Option<PathBuf>,
    pub current_view: View,
    pub filter: TreeFilter,
    pub rows: Vec<Row>,
    pub selected: usize,
    pub search: Option<SearchInput>,
    /// Matches of the last confirmed search, in tree order.
    pub matches: Vec<NodeId>,
    pub active_run: Option<ActiveRun>,
    pub tick_rate: Duration,
    pub should_quit: bool,
    pub status_message: Option<String>,
    /// Address the observer is listening on, shown in the header.
    pub endpoint: String,
    seen: Option<(u64, TreeFilter)>,
}

impl App {
    pub fn new(
        session: SharedSession,
        runner: Arc<dyn TestRunner>,
        runner_config: RunnerSection,
        tests_path: Option<PathBuf>,
    ) -> Self {
        Self {
            session,
            runner,
            runner_config,
            tests_path,
            current_view: View::Tree,
            filter: TreeFilter::default(),
            rows: Vec::new(),
            selected: 0,
            search: None,
            matches: Vec::new(),
            active_run: None,
            tick_rate: Duration::from_millis(100),
            should_quit: false,
            status_message: None,
            endpoint: String::new(),
            seen: None,
        }
    }

    /// Rebuild the visible rows if the session or the filter moved on.
    pub fn sync(&mut self) {
        let session = self.session.read();
        let key = (session.revision(), self.filter);
        if self.seen == Some(key) {
            return;
        }
        let previous = self.selected_id();
        self.rows = session.tree().rows(&self.filter);
        drop(session);

        self.seen = Some(key);
        self.selected = previous
            .and_then(|id| self.rows.iter().position(|row| row.id == id))
            .unwrap_or_else(|| self.selected.min(self.rows.len().saturating_sub(1)));
    }

    pub fn selected_id(&self) -> Option<NodeId> {
        self.rows.get(self.selected).map(|row| row.id)
    }

    // -- Navigation --

    pub fn navigate_back(&mut self) {
        match self.current_view {
            View::Tree => self.should_quit = true,
            View::Coverage | View::Log | View::Help => self.current_view = View::Tree,
        }
    }

    pub fn toggle_view(&mut self, view: View) {
        self.current_view = if self.current_view == view {
            View::Tree
        } else {
            view
        };
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if !self.rows.is_empty() && self.selected < self.rows.len() - 1 {
            self.selected += 1;
        }
    }

    pub fn toggle_filter(&mut self, which: char) {
        let (flag, name) = match which {
            '1' => (&mut self.filter.marked, "marked"),
            '2' => (&mut self.filter.passed, "passed"),
            '3' => (&mut self.filter.failed, "failed"),
            '4' => (&mut self.filter.skipped, "skipped"),
            _ => return,
        };
        *flag = !*flag;
        let state = if *flag { "shown" } else { "hidden" };
        self.status_message = Some(format!("{name} tests {state}"));
    }

    // -- Search --

    pub fn start_search(&mut self) {
        self.search = Some(SearchInput::default());
    }

    pub fn cancel_search(&mut self) {
        self.search = None;
    }

    pub fn search_push(&mut self, c: char) {
        if let Some(search) = &mut self.search {
            search.query.push(c);
        }
    }

    pub fn search_pop(&mut self) {
        if let Some(search) = &mut self.search {
            search.query.pop();
        }
    }

    /// Run the typed query and jump to the first visible match.
    pub fn confirm_search(&mut self) {
        let Some(search) = self.search.take() else {
            return;
        };
        self.matches = self.session.read().tree().search(&search.query);
        if self.matches.is_empty() {
            self.status_message = Some(format!("no match for '{}'", search.query));
            return;
        }
        self.status_message = Some(format!("{} matches", self.matches.len()));
        self.next_match();
    }

    /// Select the next match after the cursor that the filter lets through.
    pub fn next_match(&mut self) {
        let visible: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.matches.contains(&row.id))
            .map(|(i, _)| i)
            .collect();
        if let Some(&i) = visible.iter().find(|&&i| i > self.selected).or(visible.first()) {
            self.selected = i;
        }
    }

    // -- Actions --

    /// Flip the favourite flag on the selected node and everything below it.
    pub fn toggle_mark(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        let mut session = self.session.write();
        let tree = session.tree_mut();
        match tree.mark(id, None) {
            Ok(_) => {
                self.status_message = Some(format!("{} tests marked", tree.marked_leaves()));
            }
            Err(e) => {
                self.status_message = Some(format!("mark failed: {e}"));
            }
        }
    }

    /// Run the marked tests, or everything when nothing is marked.
    pub fn run_tests(&mut self) {
        let marked = self.session.read().tree().marked_nodeids();
        let selection = if !marked.is_empty() {
            Selection::NodeIds(marked)
        } else {
            self.default_selection()
        };
        self.start_run("run", self.runner_config.command().select(selection));
    }

    /// Re-collect the suite without running it.
    pub fn refresh_collection(&mut self) {
        let command = self
            .runner_config
            .command()
            .select(self.default_selection())
            .collect_only();
        self.start_run("collect", command);
    }

    fn default_selection(&self) -> Selection {
        match &self.tests_path {
            Some(path) => Selection::Path(path.clone()),
            None => Selection::All,
        }
    }

    fn start_run(&mut self, label: &'static str, command: RunnerCommand) {
        if let Some(run) = &self.active_run {
            self.status_message = Some(format!("{} already in progress", run.label));
            return;
        }
        let runner = Arc::clone(&self.runner);
        let display = command.display();
        let task = tokio::spawn(async move { runner.run(&command).await });
        self.status_message = Some(format!("{label}: {display}"));
        self.active_run = Some(ActiveRun {
            label,
            command: display,
            task,
        });
    }

    /// Reap a finished run and report how it went.
    pub async fn poll_run(&mut self) {
        if !self
            .active_run
            .as_ref()
            .is_some_and(|run| run.task.is_finished())
        {
            return;
        }
        let Some(run) = self.active_run.take() else {
            return;
        };
        let message = match run.task.await {
            Ok(Ok(output)) if output.success => {
                format!("{} finished in {:.1}s", run.label, output.duration.as_secs_f64())
            }
            Ok(Ok(output)) => format!(
                "{} exited with {} after {:.1}s",
                run.label,
                output
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "a signal".to_string()),
                output.duration.as_secs_f64()
            ),
            Ok(Err(e)) => format!("{} failed: {e:#}", run.label),
            Err(e) => format!("{} task failed: {e}", run.label),
        };
        tracing::info!(command = %run.command, %message, "run ended");
        self.status_message = Some(message);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use ayu_core::event::{Event, Outcome};
    use ayu_test_utils::{sample_collection, wait_until};

    /// Records each command and returns immediately.
    #[derive(Default)]
    struct ScriptedRunner {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TestRunner for ScriptedRunner {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&self, command: &RunnerCommand) -> Result<RunOutput> {
            self.seen.lock().unwrap().push(command.display());
            Ok(RunOutput {
                code: Some(0),
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::from_millis(1500),
            })
        }
    }

    fn app() -> (App, Arc<ScriptedRunner>) {
        let session = SharedSession::new();
        session.write().apply(&Event::Collection(sample_collection()));
        let runner = Arc::new(ScriptedRunner::default());
        let app = App::new(session, runner.clone(), RunnerSection::default(), None);
        (app, runner)
    }

    fn names(app: &App) -> Vec<String> {
        let session = app.session.read();
        app.rows
            .iter()
            .map(|row| session.tree().node(row.id).unwrap().name.clone())
            .collect()
    }

    async fn wait_for_runs(runner: &ScriptedRunner, count: usize) -> bool {
        wait_until(Duration::from_secs(2), || runner.seen.lock().unwrap().len() >= count).await
    }

    #[test]
    fn view_navigation() {
        let (mut app, _) = app();
        app.toggle_view(View::Coverage);
        assert_eq!(app.current_view, View::Coverage);
        app.toggle_view(View::Coverage);
        assert_eq!(app.current_view, View::Tree);

        app.toggle_view(View::Log);
        app.navigate_back();
        assert_eq!(app.current_view, View::Tree);
        assert!(!app.should_quit);
        app.navigate_back();
        assert!(app.should_quit);
    }

    #[test]
    fn rows_follow_session_and_filter() {
        let (mut app, _) = app();
        app.sync();
        assert_eq!(app.rows.len(), 8);

        app.session
            .write()
            .apply(&Event::outcome("tests/test_math.py::test_add", Outcome::Passed));
        app.toggle_filter('2');
        app.sync();
        assert!(!names(&app).contains(&"test_add".to_string()));
        assert_eq!(app.status_message.as_deref(), Some("passed tests hidden"));
    }

    #[test]
    fn selection_is_clamped_and_kept_across_refresh() {
        let (mut app, _) = app();
        app.sync();
        for _ in 0..20 {
            app.move_down();
        }
        assert_eq!(app.selected, app.rows.len() - 1);
        let id = app.selected_id();

        app.session
            .write()
            .apply(&Event::outcome("tests/test_math.py::test_sub", Outcome::Failed));
        app.sync();
        assert_eq!(app.selected_id(), id);

        app.move_up();
        assert_eq!(app.selected, app.rows.len() - 2);
    }

    #[test]
    fn search_jumps_to_matches() {
        let (mut app, _) = app();
        app.sync();
        app.start_search();
        for c in ":CLASS".chars() {
            app.search_push(c);
        }
        app.confirm_search();
        assert!(app.search.is_none());
        assert_eq!(names(&app)[app.selected], "TestReader");

        app.start_search();
        app.search_push('z');
        app.search_pop();
        app.search_push('q');
        app.confirm_search();
        assert_eq!(app.status_message.as_deref(), Some("no match for 'q'"));
    }

    #[tokio::test]
    async fn enter_runs_marked_tests_or_everything() {
        let (mut app, runner) = app();
        app.sync();

        app.run_tests();
        assert!(wait_for_runs(&runner, 1).await);
        assert!(
            wait_until(Duration::from_secs(2), || {
                app.active_run.as_ref().is_some_and(|run| run.task.is_finished())
            })
            .await
        );
        app.poll_run().await;
        assert!(app.active_run.is_none());
        assert_eq!(app.status_message.as_deref(), Some("run finished in 1.5s"));

        let reader = names(&app).iter().position(|n| n == "TestReader").unwrap();
        app.selected = reader;
        app.toggle_mark();
        assert_eq!(app.status_message.as_deref(), Some("2 tests marked"));

        app.run_tests();
        assert!(app.active_run.is_some());
        assert!(wait_for_runs(&runner, 2).await);

        assert_eq!(
            runner.seen.lock().unwrap().as_slice(),
            [
                "uv run --with ayu pytest".to_string(),
                "uv run --with ayu pytest \"tests/test_cls.py::TestReader::test_open\" \"tests/test_cls.py::TestReader::test_close\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn only_one_run_at_a_time() {
        let (mut app, runner) = app();
        app.refresh_collection();
        app.run_tests();
        assert_eq!(app.status_message.as_deref(), Some("collect already in progress"));

        assert!(wait_for_runs(&runner, 1).await);
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with("--co"), "got {}", seen[0]);
    }
}
