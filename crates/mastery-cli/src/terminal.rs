//! Interactive terminal front end for a single learning session.
//!
//! Renders whichever stage the controller is in and forwards the learner's
//! choices to it. Reads one line per prompt; end of input quits.

use std::io::Write;

use mastery_session::{SessionController, SessionState, Stage, MAX_ATTEMPTS};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// What the loop should do after handling one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Drives a [`SessionController`] from line-based input.
pub struct Terminal<R, W> {
    controller: SessionController,
    input: Lines<R>,
    out: W,
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(controller: SessionController, input: R, out: W) -> Self {
        Self {
            controller,
            input: input.lines(),
            out,
        }
    }

    /// Runs until the learner quits or input ends.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        writeln!(self.out, "Welcome to Mastery Loop.")?;

        loop {
            let state = self.controller.snapshot().await;
            let flow = match state.stage {
                Stage::TopicSelection => self.select_topic().await?,
                Stage::Explanation => self.show_explanation(&state).await?,
                Stage::Quiz => self.take_quiz(&state).await?,
                Stage::Result => self.show_result(&state).await?,
            };
            if flow == Flow::Quit {
                writeln!(self.out, "Goodbye!")?;
                return Ok(());
            }
        }
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn select_topic(&mut self) -> anyhow::Result<Flow> {
        let topics = self.controller.catalog().topics().to_vec();

        writeln!(self.out)?;
        writeln!(self.out, "Choose a topic:")?;
        for (i, topic) in topics.iter().enumerate() {
            writeln!(self.out, "  [{}] {topic}", i + 1)?;
        }

        let Some(line) = self
            .prompt("Enter a number or type your own topic (q to quit): ")
            .await?
        else {
            return Ok(Flow::Quit);
        };
        if is_quit(&line) {
            return Ok(Flow::Quit);
        }

        let choice = parse_choice(&line, topics.len()).map(|i| topics[i].as_str());
        let free_text = if choice.is_some() {
            None
        } else {
            Some(line.as_str())
        };
        let Some(topic) = self.controller.catalog().resolve(free_text, choice) else {
            writeln!(self.out, "Please enter a topic.")?;
            return Ok(Flow::Continue);
        };

        writeln!(self.out, "Loading explanation for {topic}...")?;
        let result = self.controller.start_learning(&topic).await;
        self.report(result)?;
        Ok(Flow::Continue)
    }

    async fn show_explanation(&mut self, state: &SessionState) -> anyhow::Result<Flow> {
        writeln!(self.out)?;
        writeln!(self.out, "== {} ==", state.topic.as_deref().unwrap_or_default())?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", state.explanation)?;
        writeln!(self.out)?;
        writeln!(self.out, "  [1] Take the quiz")?;
        writeln!(self.out, "  [2] Choose another topic")?;
        writeln!(self.out, "  [q] Quit")?;

        let Some(line) = self.prompt("> ").await? else {
            return Ok(Flow::Quit);
        };
        match line.as_str() {
            "1" => {
                writeln!(self.out, "Generating quiz...")?;
                let result = self.controller.start_quiz().await;
                self.report(result)?;
            }
            "2" => {
                self.controller.reset().await;
            }
            _ if is_quit(&line) => return Ok(Flow::Quit),
            _ => writeln!(self.out, "Please choose 1, 2 or q.")?,
        }
        Ok(Flow::Continue)
    }

    async fn take_quiz(&mut self, state: &SessionState) -> anyhow::Result<Flow> {
        let Some(quiz) = &state.quiz else {
            self.controller.reset().await;
            return Ok(Flow::Continue);
        };

        let next = (0..quiz.len()).find(|&i| state.answers.get(i).is_none());
        let Some(index) = next else {
            // Only reached after a submit attempt failed.
            return self.after_failed_submit(state).await;
        };

        let question = &quiz.questions[index];
        writeln!(self.out)?;
        if index == 0 {
            writeln!(self.out, "Relevance: {}/100", quiz.relevance_score)?;
        }
        writeln!(
            self.out,
            "Question {}/{}: {}",
            index + 1,
            quiz.len(),
            question.question
        )?;
        for (i, option) in question.options.iter().enumerate() {
            writeln!(self.out, "  [{}] {option}", i + 1)?;
        }

        let Some(line) = self
            .prompt("Your answer (t for another topic, q to quit): ")
            .await?
        else {
            return Ok(Flow::Quit);
        };
        if is_quit(&line) {
            return Ok(Flow::Quit);
        }
        if line.eq_ignore_ascii_case("t") {
            self.controller.reset().await;
            return Ok(Flow::Continue);
        }
        let Some(option) = parse_choice(&line, question.options.len()) else {
            writeln!(
                self.out,
                "Please enter a number between 1 and {}.",
                question.options.len()
            )?;
            return Ok(Flow::Continue);
        };

        match self.controller.record_answer(index, option).await {
            Ok(updated) if updated.answers.is_complete() => self.submit().await?,
            Ok(_) => {}
            Err(e) => writeln!(self.out, "Error: {e}")?,
        }
        Ok(Flow::Continue)
    }

    async fn after_failed_submit(&mut self, state: &SessionState) -> anyhow::Result<Flow> {
        let can_submit = state.can_submit();
        writeln!(self.out)?;
        if can_submit {
            writeln!(self.out, "  [s] Submit again")?;
        }
        writeln!(self.out, "  [t] Choose another topic")?;
        writeln!(self.out, "  [q] Quit")?;

        let Some(line) = self.prompt("> ").await? else {
            return Ok(Flow::Quit);
        };
        match line.to_ascii_lowercase().as_str() {
            "s" if can_submit => self.submit().await?,
            "t" => {
                self.controller.reset().await;
            }
            "q" | "quit" => return Ok(Flow::Quit),
            _ => writeln!(self.out, "Please choose one of the listed options.")?,
        }
        Ok(Flow::Continue)
    }

    async fn show_result(&mut self, state: &SessionState) -> anyhow::Result<Flow> {
        let Some(evaluation) = state.evaluation else {
            self.controller.reset().await;
            return Ok(Flow::Continue);
        };

        writeln!(self.out)?;
        writeln!(
            self.out,
            "Score: {}% ({})",
            evaluation.score,
            if evaluation.passed() {
                "passed"
            } else {
                "not yet"
            }
        )?;
        writeln!(
            self.out,
            "Attempt {} of {MAX_ATTEMPTS}",
            evaluation.attempt_number
        )?;
        if !state.simplified_explanation.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "Let's try it another way:")?;
            writeln!(self.out, "{}", state.simplified_explanation)?;
        }
        if state.is_exhausted() {
            writeln!(self.out, "You have used every attempt for this topic.")?;
        }

        let can_retry = state.can_retry();
        writeln!(self.out)?;
        if can_retry {
            writeln!(self.out, "  [r] Retry the quiz")?;
        }
        writeln!(self.out, "  [n] Next topic")?;
        writeln!(self.out, "  [t] Choose another topic")?;
        writeln!(self.out, "  [q] Quit")?;

        let Some(line) = self.prompt("> ").await? else {
            return Ok(Flow::Quit);
        };
        match line.to_ascii_lowercase().as_str() {
            "r" if can_retry => {
                writeln!(self.out, "Generating a new quiz...")?;
                let result = self.controller.retry_quiz().await;
                self.report(result)?;
            }
            "n" => {
                let result = self.controller.advance_topic().await;
                self.report(result)?;
            }
            "t" => {
                self.controller.reset().await;
            }
            "q" => return Ok(Flow::Quit),
            _ => writeln!(self.out, "Please choose one of the listed options.")?,
        }
        Ok(Flow::Continue)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn submit(&mut self) -> anyhow::Result<()> {
        writeln!(self.out, "Grading...")?;
        let result = self.controller.submit_quiz().await;
        self.report(result)
    }

    /// Prints the error of a failed operation; successes render on the next pass.
    fn report(&mut self, result: mastery_session::Result<SessionState>) -> anyhow::Result<()> {
        if let Err(e) = result {
            writeln!(self.out, "Error: {e}")?;
        }
        Ok(())
    }

    async fn prompt(&mut self, text: &str) -> anyhow::Result<Option<String>> {
        write!(self.out, "{text}")?;
        self.out.flush()?;
        Ok(self
            .input
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }
}

fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit")
}

/// Parses a 1-based menu choice into a 0-based index below `count`.
fn parse_choice(line: &str, count: usize) -> Option<usize> {
    line.parse::<usize>()
        .ok()
        .filter(|n| (1..=count).contains(n))
        .map(|n| n - 1)
}
