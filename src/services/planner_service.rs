use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::preferences::Preferences;
use crate::models::session::{Session, TrainingProgram};
use crate::services::fallback_distributor::distribute_every_other_day;
use crate::services::parser_service::SessionParser;

/// Turns free-form program text into dated session candidates. Date
/// suggestions come from the parser collaborator when it cooperates and from
/// the every-other-day distributor otherwise.
pub struct PlannerService {
    parser: Arc<dyn SessionParser>,
    preferences: Preferences,
}

impl PlannerService {
    pub fn new(parser: Arc<dyn SessionParser>, preferences: Preferences) -> Self {
        Self {
            parser,
            preferences,
        }
    }

    /// Parse the program text and produce one dated candidate per session.
    /// A parse failure is fatal: with no sessions there is nothing to place.
    pub async fn generate_candidates(
        &self,
        raw_text: &str,
        start_date: NaiveDate,
    ) -> AppResult<Vec<Session>> {
        let program = self
            .parser
            .parse_program(raw_text, &self.preferences)
            .await
            .map_err(|err| AppError::schedule_generation(format!("解析训练计划失败: {err}")))?;

        Ok(self.schedule_program(&program, start_date).await)
    }

    /// Assign a date and the preferred start time to every session of an
    /// already-parsed program. Suggestion failures never bubble up; the
    /// distributor guarantees a usable placement.
    pub async fn schedule_program(
        &self,
        program: &TrainingProgram,
        start_date: NaiveDate,
    ) -> Vec<Session> {
        let preferred_time = self.preferences.preferred_start;

        match self
            .parser
            .suggest_dates(program, start_date, &self.preferences)
            .await
        {
            Ok(dates) if dates.len() == program.sessions.len() => {
                info!(
                    target: "app::planner",
                    sessions = program.sessions.len(),
                    "using suggested dates"
                );
                program
                    .sessions
                    .iter()
                    .zip(dates)
                    .map(|(session, date)| session.scheduled_at(date, preferred_time))
                    .collect()
            }
            Ok(dates) => {
                warn!(
                    target: "app::planner",
                    suggested = dates.len(),
                    expected = program.sessions.len(),
                    "suggested date count mismatch, falling back to even distribution"
                );
                distribute_every_other_day(&program.sessions, start_date, preferred_time)
            }
            Err(error) => {
                warn!(
                    target: "app::planner",
                    %error,
                    "date suggestion failed, falling back to even distribution"
                );
                distribute_every_other_day(&program.sessions, start_date, preferred_time)
            }
        }
    }
}
