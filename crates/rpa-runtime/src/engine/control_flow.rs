use super::*;

/// Children of a `Try`, split at its `Catch` and `Finally` markers.
struct TrySections<'a> {
    body: &'a [Action],
    catch: Option<(Option<&'a str>, &'a [Action])>,
    finally: Option<&'a [Action]>,
}

fn split_try(children: &[Action]) -> TrySections<'_> {
    let catch_index = children
        .iter()
        .position(|child| matches!(child.command, Command::Catch { .. }));
    let finally_index = children
        .iter()
        .position(|child| matches!(child.command, Command::Finally));

    let body_end = [catch_index, finally_index]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(children.len());

    let catch = catch_index.map(|index| {
        let end = match finally_index {
            Some(finally) if finally > index => finally,
            _ => children.len(),
        };
        let error_variable = match &children[index].command {
            Command::Catch { error_variable } => error_variable.as_deref(),
            _ => None,
        };
        (error_variable, &children[index + 1..end])
    });

    let finally = finally_index.map(|index| {
        let end = match catch_index {
            Some(catch) if catch > index => catch,
            _ => children.len(),
        };
        &children[index + 1..end]
    });

    TrySections {
        body: &children[..body_end],
        catch,
        finally,
    }
}

/// `Case`/`DefaultCase` groups of a `Switch`. Actions before the first
/// marker belong to no case.
fn switch_groups(children: &[Action]) -> Vec<(&Command, &[Action])> {
    let starts = children
        .iter()
        .enumerate()
        .filter(|(_, child)| matches!(child.command, Command::Case { .. } | Command::DefaultCase))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    starts
        .iter()
        .enumerate()
        .map(|(position, &start)| {
            let end = starts.get(position + 1).copied().unwrap_or(children.len());
            (&children[start].command, &children[start + 1..end])
        })
        .collect()
}

impl ExecutionEngine {
    pub(super) fn execute_scope(&mut self, action: &Action) -> Result<ControlSignal, EngineError> {
        match &action.command {
            Command::If { predicate } => {
                let condition = self.evaluate_predicate(predicate)?;
                self.execute_branch(action, condition)
            }
            Command::MultiIf { logic, predicates } => {
                let condition = self.evaluate_predicates(*logic, predicates)?;
                self.execute_branch(action, condition)
            }
            Command::Loop {
                mode,
                index_variable,
            } => self.execute_loop(action, mode, index_variable.as_deref()),
            Command::Retry {
                attempts,
                delay_ms,
                until,
            } => {
                self.handler_depth += 1;
                let result = self.execute_retry(action, *attempts, *delay_ms, until.as_ref());
                self.handler_depth -= 1;
                self.rethrown(action, result)
            }
            Command::Try => self.execute_try(action),
            Command::Switch { selector } => self.execute_switch(action, selector),
            _ => self.run_children(&action.children),
        }
    }

    /// Runs `children` in order until one of them yields anything other
    /// than `Continue`. Markers are section boundaries and never dispatch.
    pub(super) fn run_children(&mut self, children: &[Action]) -> Result<ControlSignal, EngineError> {
        for child in children {
            if child.command.category() == CommandCategory::Marker {
                continue;
            }
            if self.is_cancelled() {
                return Ok(ControlSignal::Cancel);
            }
            match self.execute_action(child)? {
                ControlSignal::Continue => {}
                signal => return Ok(signal),
            }
        }
        Ok(ControlSignal::Continue)
    }

    fn execute_branch(&mut self, action: &Action, condition: bool) -> Result<ControlSignal, EngineError> {
        let children = action.children.as_slice();
        let else_index = children
            .iter()
            .position(|child| matches!(child.command, Command::Else));
        let selected = match (else_index, condition) {
            (Some(index), true) => &children[..index],
            (Some(index), false) => &children[index + 1..],
            (None, true) => children,
            (None, false) => &children[..0],
        };
        self.run_children(selected)
    }

    fn execute_loop(
        &mut self,
        action: &Action,
        mode: &LoopKind,
        index_variable: Option<&str>,
    ) -> Result<ControlSignal, EngineError> {
        match mode {
            LoopKind::Count { times } => {
                let count = self.evaluate_count(times)?;
                for index in 0..count {
                    if let Some(signal) = self.loop_iteration(action, index_variable, index)? {
                        return Ok(signal);
                    }
                }
            }
            LoopKind::While { predicate } => {
                let mut index = 0usize;
                loop {
                    if self.is_cancelled() {
                        return Ok(ControlSignal::Cancel);
                    }
                    if !self.evaluate_predicate(predicate)? {
                        break;
                    }
                    if let Some(signal) = self.loop_iteration(action, index_variable, index)? {
                        return Ok(signal);
                    }
                    index += 1;
                }
            }
            LoopKind::Collection {
                items,
                item_variable,
            } => {
                let values = self.evaluate_collection(items)?;
                for (index, item) in values.into_iter().enumerate() {
                    if self.is_cancelled() {
                        return Ok(ControlSignal::Cancel);
                    }
                    self.state.set_variable(item_variable.clone(), item);
                    if let Some(signal) = self.loop_iteration(action, index_variable, index)? {
                        return Ok(signal);
                    }
                }
            }
        }
        Ok(ControlSignal::Continue)
    }

    /// One pass over the loop body. `Some` ends the loop with that signal.
    fn loop_iteration(
        &mut self,
        action: &Action,
        index_variable: Option<&str>,
        index: usize,
    ) -> Result<Option<ControlSignal>, EngineError> {
        if self.is_cancelled() {
            return Ok(Some(ControlSignal::Cancel));
        }
        if let Some(name) = index_variable {
            self.state.set_variable(name, Value::Int(index as i64));
        }
        match self.run_children(&action.children)? {
            ControlSignal::Continue | ControlSignal::ContinueLoop => Ok(None),
            ControlSignal::Break => Ok(Some(ControlSignal::Continue)),
            ControlSignal::Cancel => Ok(Some(ControlSignal::Cancel)),
        }
    }

    fn execute_retry(
        &mut self,
        action: &Action,
        attempts: u32,
        delay_ms: u64,
        until: Option<&Predicate>,
    ) -> Result<ControlSignal, EngineError> {
        let attempts = attempts.max(1);
        let delay = Duration::from_millis(delay_ms);

        for attempt in 1..=attempts {
            if self.is_cancelled() {
                return Ok(ControlSignal::Cancel);
            }
            let mark = self.state.errors().len();
            let error = match self.run_children(&action.children) {
                Ok(ControlSignal::Cancel) => return Ok(ControlSignal::Cancel),
                Ok(_) if self.state.child_failure_pending() => self.pending_child_error(),
                Ok(signal) => {
                    let satisfied = match until {
                        Some(predicate) => self.evaluate_predicate(predicate)?,
                        None => true,
                    };
                    if satisfied {
                        if attempt > 1 {
                            info!(line = action.line, attempt, "retry recovered");
                        }
                        return Ok(signal);
                    }
                    EngineError::new(
                        "ENGINE_RETRY_CONDITION_UNMET",
                        format!(
                            "Retry condition \"{}\" still false after {} attempt(s).",
                            until.map(Predicate::describe).unwrap_or_default(),
                            attempt
                        ),
                    )
                }
                Err(error) if error.is_cancellation() => return Ok(ControlSignal::Cancel),
                Err(error) => error,
            };

            if attempt == attempts {
                self.state.acknowledge_child_failure();
                return Err(error);
            }

            warn!(
                line = action.line,
                attempt,
                attempts,
                "retrying after failure: {}",
                error.message
            );
            self.state.truncate_errors(mark);
            self.state.acknowledge_child_failure();
            if !self.controller.sleep(delay) {
                return Ok(ControlSignal::Cancel);
            }
        }
        Ok(ControlSignal::Continue)
    }

    fn execute_try(&mut self, action: &Action) -> Result<ControlSignal, EngineError> {
        let sections = split_try(&action.children);
        let mark = self.state.errors().len();

        self.handler_depth += 1;
        let body = self.run_children(sections.body);
        self.handler_depth -= 1;

        let mut outcome = match body {
            Ok(ControlSignal::Cancel) => return Ok(ControlSignal::Cancel),
            Err(error) if error.is_cancellation() => return Ok(ControlSignal::Cancel),
            Ok(signal) if !self.state.child_failure_pending() => Ok(signal),
            Ok(signal) => match sections.catch {
                Some(catch) => {
                    let error = self.pending_child_error();
                    self.run_catch(mark, error, catch)
                }
                None => Ok(signal),
            },
            Err(error) => match sections.catch {
                Some(catch) => self.run_catch(mark, error, catch),
                None => self.rethrown(action, Err(error)),
            },
        };

        if let Some(finally) = sections.finally {
            if self.is_cancelled() {
                return Ok(ControlSignal::Cancel);
            }
            match self.run_children(finally) {
                Ok(ControlSignal::Continue) => {}
                other => outcome = other,
            }
        }
        outcome
    }

    fn run_catch(
        &mut self,
        mark: usize,
        error: EngineError,
        (error_variable, actions): (Option<&str>, &[Action]),
    ) -> Result<ControlSignal, EngineError> {
        debug!(code = %error.code, "caught: {}", error.message);
        self.state.truncate_errors(mark);
        self.state.acknowledge_child_failure();
        if let Some(name) = error_variable {
            self.state.set_variable(name, Value::String(error.message));
        }
        self.run_children(actions)
    }

    fn execute_switch(&mut self, action: &Action, selector: &str) -> Result<ControlSignal, EngineError> {
        let selected = self.evaluate(selector)?.to_text();
        let mut fallback = None;
        for (label, actions) in switch_groups(&action.children) {
            match label {
                Command::Case { value } => {
                    if self.render(value)? == selected {
                        return self.run_children(actions);
                    }
                }
                _ => {
                    fallback.get_or_insert(actions);
                }
            }
        }
        match fallback {
            Some(actions) => self.run_children(actions),
            None => Ok(ControlSignal::Continue),
        }
    }
}
