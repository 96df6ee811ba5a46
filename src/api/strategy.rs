use std::future::Future;

/// Outcome of one attempt in an ordered fallback sequence.
#[derive(Debug)]
pub enum Step<T, E> {
    /// Success; no further candidates are tried.
    Done(T),
    /// Failure worth recording; move on to the next candidate.
    Next(E),
    /// Failure that no other candidate can fix; abort the sequence.
    Stop(E),
}

/// Try each candidate in order until one succeeds.
///
/// Returns the first `Done` value. A `Stop` aborts immediately with its error.
/// When every candidate yields `Next`, the last recorded error is returned, or
/// `None` if there were no candidates at all.
pub async fn first_success<C, T, E, F, Fut>(candidates: C, mut attempt: F) -> Result<T, Option<E>>
where
    C: IntoIterator,
    F: FnMut(C::Item) -> Fut,
    Fut: Future<Output = Step<T, E>>,
{
    let mut last_error = None;
    for candidate in candidates {
        match attempt(candidate).await {
            Step::Done(value) => return Ok(value),
            Step::Next(error) => last_error = Some(error),
            Step::Stop(error) => return Err(Some(error)),
        }
    }
    Err(last_error)
}
