pub mod calendar_service;
pub mod conflict_filter;
pub mod fallback_distributor;
pub mod parser_service;
pub mod planner_service;
pub mod prompt_templates;
pub mod schedule_utils;
pub mod scheduler_service;
