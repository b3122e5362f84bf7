//! Two hackers race to guess a vault password while the police count down.
//!
//! Whoever finishes first cancels the shared token, which stops the others at
//! their next password check or countdown tick.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::cancel::{CancellationToken, Cancelled};
use crate::error::Result;
use crate::task::{spawn_task_with_token, InterruptibleTask, TaskOutcome};

pub struct Vault {
    password: u32,
    check_delay: Duration,
}

impl Vault {
    pub fn new(password: u32, check_delay: Duration) -> Self {
        Self { password, check_delay }
    }

    pub fn with_random_password(max_password: u32, check_delay: Duration) -> Self {
        let password = rand::thread_rng().gen_range(0..max_password.max(1));
        Self::new(password, check_delay)
    }

    /// Each check is slow; a cancelled token cuts the wait short.
    pub fn is_correct_password(&self, guess: u32, token: &CancellationToken) -> std::result::Result<bool, Cancelled> {
        token.sleep(self.check_delay)?;
        Ok(guess == self.password)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HackerStrategy {
    Ascending,
    Descending,
}

impl HackerStrategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ascending => "AscendingHacker",
            Self::Descending => "DescendingHacker",
        }
    }
}

struct Hacker {
    vault: Arc<Vault>,
    strategy: HackerStrategy,
    max_password: u32,
}

impl InterruptibleTask for Hacker {
    type Output = Option<u32>;

    fn sentinel(&self) -> Option<u32> {
        None
    }

    fn run(&mut self, token: &CancellationToken) -> std::result::Result<Option<u32>, Cancelled> {
        let guesses: Box<dyn Iterator<Item = u32>> = match self.strategy {
            HackerStrategy::Ascending => Box::new(0..=self.max_password),
            HackerStrategy::Descending => Box::new((0..=self.max_password).rev()),
        };
        for guess in guesses {
            if self.vault.is_correct_password(guess, token)? {
                tracing::info!("{} guessed the password. password is {guess}", self.strategy.name());
                token.cancel();
                return Ok(Some(guess));
            }
        }
        Ok(None)
    }
}

struct Police {
    countdown: u32,
    tick: Duration,
}

impl InterruptibleTask for Police {
    type Output = ();

    fn sentinel(&self) {}

    fn run(&mut self, token: &CancellationToken) -> std::result::Result<(), Cancelled> {
        for remaining in (0..=self.countdown).rev() {
            token.sleep(self.tick)?;
            tracing::info!("count : {remaining}");
        }
        tracing::info!("Game over for you hackers");
        token.cancel();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeistPlan {
    pub max_password: u32,
    pub countdown: u32,
    pub tick: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeistOutcome {
    Cracked { by: HackerStrategy, password: u32 },
    Caught,
}

pub fn run_heist(vault: Arc<Vault>, plan: HeistPlan) -> Result<HeistOutcome> {
    let token = CancellationToken::new();

    let hackers = [HackerStrategy::Ascending, HackerStrategy::Descending]
        .into_iter()
        .map(|strategy| {
            tracing::info!("Starting thread {}", strategy.name());
            let hacker = Hacker {
                vault: Arc::clone(&vault),
                strategy,
                max_password: plan.max_password,
            };
            spawn_task_with_token(strategy.name(), hacker, token.clone()).map(|handle| (strategy, handle))
        })
        .collect::<Result<Vec<_>>>()?;
    let police = spawn_task_with_token(
        "PoliceThread",
        Police {
            countdown: plan.countdown,
            tick: plan.tick,
        },
        token.clone(),
    )?;

    let mut cracked = None;
    for (strategy, handle) in hackers {
        if let TaskOutcome::Completed(Some(password)) = handle.join()? {
            cracked.get_or_insert(HeistOutcome::Cracked { by: strategy, password });
        }
    }
    // Both hackers exhausting their guesses leaves the police to finish the countdown.
    police.join()?;

    Ok(cracked.unwrap_or(HeistOutcome::Caught))
}
