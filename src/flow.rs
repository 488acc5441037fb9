//! The scripted user journey as an explicit state sequence.
//!
//! One iteration walks `Login → Menu → Filter → Detail → Logout`, threading
//! the session state produced by each step into the next. The first failed
//! step moves the iteration to its aborted terminal and skips everything
//! after it — in particular, an abort before Logout abandons the session
//! rather than closing it, like a browser tab slammed shut. No step is ever
//! retried within an iteration.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, Delays};
use crate::credentials::Credential;
use crate::executor::StopHandle;
use crate::metric::{FlowMetric, StepMetric};
use crate::pacing::Pacing;
use crate::step::{SessionState, StepRunner, StepSpec, TokenPolicy};
use crate::validate::Validation;

/// The journey's phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Login,
    Menu,
    Filter,
    Detail,
    Logout,
}

impl Phase {
    pub const fn first() -> Self {
        Phase::Login
    }

    /// The transition table. `None` is the completed terminal.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Login => Some(Phase::Menu),
            Phase::Menu => Some(Phase::Filter),
            Phase::Filter => Some(Phase::Detail),
            Phase::Detail => Some(Phase::Logout),
            Phase::Logout => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Login => "login",
            Phase::Menu => "menu",
            Phase::Filter => "filter",
            Phase::Detail => "detail",
            Phase::Logout => "logout",
        };
        f.write_str(name)
    }
}

/// How an iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Disposition {
    /// Every phase ran and succeeded.
    Completed,
    /// A step failed in `phase`; the remaining phases were skipped.
    Aborted { phase: Phase },
    /// The external deadline fired before `phase` started.
    Interrupted { phase: Phase },
}

/// The concrete step specs of one journey against one target application.
#[derive(Debug, Clone)]
pub struct FlowPlan {
    login_page: StepSpec,
    login_submit: StepSpec,
    menu: StepSpec,
    filter: StepSpec,
    detail: StepSpec,
    logout: StepSpec,
    login_form: String,
    user_field: String,
    password_field: String,
}

impl FlowPlan {
    pub fn from_config(config: &AppConfig) -> Self {
        let c = &config.components;
        let login_url = config.url(&config.endpoints.login);

        let login_page = StepSpec::builder()
            .name("login_page")
            .method(Method::GET)
            .url(login_url.clone())
            .validation(Validation::FullPage { min_len: 200 })
            .token_policy(TokenPolicy::Required)
            .timeout(config.timeouts.login())
            .build();

        // Credential fields are appended per iteration; see `login_submit`.
        let login_submit = StepSpec::builder()
            .name("login_submit")
            .method(Method::POST)
            .url(login_url)
            .form(vec![
                (c.login_form.clone(), c.login_form.clone()),
                (
                    format!("{}:{}", c.login_form, c.submit_field),
                    c.submit_label.clone(),
                ),
            ])
            .token_field(Some(c.view_state_field.clone()))
            .validation(Validation::AuthRedirect)
            .timeout(config.timeouts.login())
            .build();

        let menu = StepSpec::builder()
            .name("menu")
            .method(Method::GET)
            .url(config.url(&config.endpoints.menu))
            .validation(Validation::FullPage { min_len: 200 })
            .token_policy(TokenPolicy::Required)
            .timeout(config.timeouts.page_load())
            .build();

        let table = format!("{}:{}", c.table_form, c.table);
        let filter = StepSpec::builder()
            .name("filter")
            .method(Method::POST)
            .url(config.url(&config.endpoints.filter))
            .form(vec![
                ("javax.faces.partial.ajax".to_owned(), "true".to_owned()),
                ("javax.faces.source".to_owned(), table.clone()),
                ("javax.faces.partial.execute".to_owned(), table.clone()),
                ("javax.faces.partial.render".to_owned(), table.clone()),
                (format!("{table}_filtering"), "true".to_owned()),
                (
                    format!("{table}:{}", c.filter_field),
                    config.defaults.client_filter.clone(),
                ),
            ])
            .token_field(Some(c.view_state_field.clone()))
            .partial(true)
            .validation(Validation::Partial)
            .token_policy(TokenPolicy::Optional)
            .timeout(config.timeouts.request())
            .build();

        let detail = StepSpec::builder()
            .name("detail")
            .method(Method::POST)
            .url(config.url(&config.endpoints.detail))
            .form(vec![
                ("javax.faces.partial.ajax".to_owned(), "true".to_owned()),
                (
                    "javax.faces.source".to_owned(),
                    format!("{}:{}", c.detail_form, c.detail_source),
                ),
                ("javax.faces.partial.execute".to_owned(), "@all".to_owned()),
                (
                    "javax.faces.partial.render".to_owned(),
                    format!("{} {}", c.detail_form, c.table_form),
                ),
                (
                    format!("{}:{}", c.detail_form, c.detail_field),
                    config.defaults.detail_kind.clone(),
                ),
            ])
            .token_field(Some(c.view_state_field.clone()))
            .partial(true)
            .validation(Validation::Partial)
            .token_policy(TokenPolicy::Optional)
            .timeout(config.timeouts.request())
            .build();

        let logout = StepSpec::builder()
            .name("logout")
            .method(Method::POST)
            .url(config.url(&config.endpoints.logout))
            .form(vec![
                (c.logout_form.clone(), c.logout_form.clone()),
                (
                    format!("{}:{}", c.logout_form, c.logout_button),
                    c.logout_label.clone(),
                ),
            ])
            .token_field(Some(c.view_state_field.clone()))
            .validation(Validation::AuthRedirect)
            .timeout(config.timeouts.request())
            .build();

        Self {
            login_page,
            login_submit,
            menu,
            filter,
            detail,
            logout,
            login_form: c.login_form.clone(),
            user_field: c.user_field.clone(),
            password_field: c.password_field.clone(),
        }
    }

    /// The credential POST for one iteration's account.
    fn login_submit(&self, credential: &Credential) -> StepSpec {
        let mut spec = self.login_submit.clone();
        spec.form.push((
            format!("{}:{}", self.login_form, self.user_field),
            credential.email.clone(),
        ));
        spec.form.push((
            format!("{}:{}", self.login_form, self.password_field),
            credential.password.clone(),
        ));
        spec
    }
}

/// Runs complete iterations of the journey for one virtual user at a time.
///
/// Holds no session state of its own: every iteration starts from
/// [`SessionState::fresh`], so concurrent iterations never share anything
/// but the runner's connection pool.
pub struct FlowDriver<R> {
    runner: R,
    plan: FlowPlan,
    delays: Delays,
}

impl<R> FlowDriver<R>
where
    R: StepRunner + Send + Sync,
{
    pub fn new(runner: R, plan: FlowPlan, delays: Delays) -> Self {
        Self {
            runner,
            plan,
            delays,
        }
    }

    /// One complete iteration for `credential`. Never fails as such — every
    /// outcome, including transport errors on each step, is data in the
    /// returned metric.
    pub async fn run_iteration(&self, credential: &Credential, stop: &StopHandle) -> FlowMetric {
        let mut session = SessionState::fresh();
        let mut steps = Vec::new();
        let mut phase = Phase::first();

        loop {
            if stop.is_stopped() {
                return FlowMetric {
                    steps,
                    disposition: Disposition::Interrupted { phase },
                };
            }

            let succeeded = self
                .run_phase(phase, credential, &mut session, &mut steps)
                .await;
            if !succeeded {
                tracing::warn!(user = %credential.email, %phase, "step failed; aborting iteration");
                return FlowMetric {
                    steps,
                    disposition: Disposition::Aborted { phase },
                };
            }

            self.pause_after(phase).await;
            match phase.next() {
                Some(next) => phase = next,
                None => {
                    return FlowMetric {
                        steps,
                        disposition: Disposition::Completed,
                    }
                }
            }
        }
    }

    async fn run_phase(
        &self,
        phase: Phase,
        credential: &Credential,
        session: &mut SessionState,
        steps: &mut Vec<StepMetric>,
    ) -> bool {
        match phase {
            Phase::Login => {
                if !self.exec(&self.plan.login_page, session, steps).await {
                    return false;
                }
                let submit = self.plan.login_submit(credential);
                // A login that "succeeded" without leaving a usable token is
                // still a dead session.
                self.exec(&submit, session, steps).await && session.token.is_some()
            }
            Phase::Menu => self.exec(&self.plan.menu, session, steps).await,
            Phase::Filter => self.exec(&self.plan.filter, session, steps).await,
            Phase::Detail => self.exec(&self.plan.detail, session, steps).await,
            Phase::Logout => self.exec(&self.plan.logout, session, steps).await,
        }
    }

    async fn exec(
        &self,
        spec: &StepSpec,
        session: &mut SessionState,
        steps: &mut Vec<StepMetric>,
    ) -> bool {
        let result = self.runner.run(spec, session).await;
        steps.push(StepMetric::of(spec, &result));
        if result.succeeded {
            session.token = result.token;
            session.cookies = result.cookies;
            true
        } else {
            false
        }
    }

    async fn pause_after(&self, phase: Phase) {
        let base = self.delays.after(phase);
        if base.is_zero() {
            return;
        }
        let pause = {
            let mut rng = rand::thread_rng();
            Pacing::new(base, self.delays.variance).jittered(&mut rng)
        };
        tokio::time::sleep(pause).await;
    }
}
