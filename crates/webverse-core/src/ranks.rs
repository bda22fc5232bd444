//! XP and rank gamification for the dashboard.

use crate::lab::{Difficulty, Lab};
use crate::progress::ProgressMap;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

pub const RANKS: [(&str, u64); 12] = [
    ("Bronze I", 0),
    ("Bronze II", 300),
    ("Bronze III", 700),
    ("Silver I", 1200),
    ("Silver II", 2000),
    ("Silver III", 3000),
    ("Gold I", 4500),
    ("Gold II", 6500),
    ("Gold III", 9000),
    ("Platinum", 12000),
    ("Diamond", 16000),
    ("Master", 21000),
];

pub fn base_xp(difficulty: &Difficulty) -> u64 {
    match difficulty {
        Difficulty::Easy => 50,
        Difficulty::Medium => 120,
        Difficulty::Hard => 250,
        Difficulty::Master => 450,
        Difficulty::Other(_) => 0,
    }
}

pub fn attempt_bonus(attempts: u64) -> u64 {
    match attempts {
        0..=1 => 50,
        2..=3 => 25,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankPosition {
    pub name: &'static str,
    pub floor: u64,
    pub next: Option<(&'static str, u64)>,
}

impl RankPosition {
    /// XP still needed for the next rank, `None` at the top.
    pub fn xp_to_next(&self, xp: u64) -> Option<u64> {
        self.next.map(|(_, floor)| floor.saturating_sub(xp))
    }
}

pub fn rank_for_xp(xp: u64) -> RankPosition {
    let idx = RANKS
        .iter()
        .rposition(|(_, floor)| xp >= *floor)
        .unwrap_or(0);
    let (name, floor) = RANKS[idx];
    RankPosition {
        name,
        floor,
        next: RANKS.get(idx + 1).copied(),
    }
}

fn is_solved(progress: &ProgressMap, lab: &Lab) -> bool {
    progress.get(&lab.id).map_or(false, |p| p.is_solved())
}

pub fn total_xp(labs: &[Lab], progress: &ProgressMap) -> u64 {
    labs.iter()
        .filter(|lab| is_solved(progress, lab))
        .map(|lab| base_xp(&lab.difficulty))
        .sum()
}

/// XP a solved lab earns on the progress page: difficulty base plus the attempt bonus.
/// Unsolved labs earn nothing.
pub fn lab_xp(lab: &Lab, progress: &ProgressMap) -> u64 {
    match progress.get(&lab.id) {
        Some(record) if record.is_solved() => {
            base_xp(&lab.difficulty) + attempt_bonus(record.attempts)
        }
        _ => 0,
    }
}

/// Attempt bonuses summed over solved labs. Ranks are computed from base XP only.
pub fn bonus_xp(labs: &[Lab], progress: &ProgressMap) -> u64 {
    labs.iter()
        .filter(|lab| is_solved(progress, lab))
        .filter_map(|lab| progress.get(&lab.id))
        .map(|record| attempt_bonus(record.attempts))
        .sum()
}

pub fn solved_count(labs: &[Lab], progress: &ProgressMap) -> usize {
    labs.iter().filter(|lab| is_solved(progress, lab)).count()
}

pub fn completion_percent(total: usize, solved: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((solved as f64 / total as f64) * 100.0).round_ties_even() as u32
}

/// Consecutive days, ending `today`, with at least one solve.
pub fn solve_streak_days(progress: &ProgressMap, today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = progress
        .values()
        .filter_map(|p| p.solved_at_local())
        .map(|dt| dt.date_naive())
        .collect();
    let mut streak = 0;
    let mut cur = today;
    while days.contains(&cur) {
        streak += 1;
        cur -= Duration::days(1);
    }
    streak
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub total_labs: usize,
    pub solved: usize,
    pub completion_percent: u32,
    pub xp: u64,
    pub bonus_xp: u64,
    pub rank: RankPosition,
    pub attempts: u64,
    pub streak_days: u32,
}

impl Dashboard {
    pub fn build(labs: &[Lab], progress: &ProgressMap, attempts: u64, today: NaiveDate) -> Self {
        let solved = solved_count(labs, progress);
        let xp = total_xp(labs, progress);
        Self {
            total_labs: labs.len(),
            solved,
            completion_percent: completion_percent(labs.len(), solved),
            xp,
            bonus_xp: bonus_xp(labs, progress),
            rank: rank_for_xp(xp),
            attempts,
            streak_days: solve_streak_days(progress, today),
        }
    }
}
