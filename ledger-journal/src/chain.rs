//! Post-handler chains
//!
//! A chain is an ordered list of [`PostHandler`] stages ending in a
//! [`PostSink`]. Each posting fed to the chain enters the first stage, which
//! may drop it, forward it immediately or hold it back until
//! [`PostSink::finalize`] flushes the stages in order.

use std::fmt;

use log::debug;

use crate::error::JournalError;
use crate::filters::FilterChain;
use crate::journal::Journal;
use crate::posting::PostingRef;

/// Outcome of delivering a posting
pub type HandlerResult = Result<(), JournalError>;

/// An intermediate stage of a chain
pub trait PostHandler<'j>: fmt::Debug {
    /// Process one posting, forwarding any output through `next`
    fn handle(
        &mut self,
        post: PostingRef<'j>,
        next: &mut dyn FnMut(PostingRef<'j>) -> HandlerResult,
    ) -> HandlerResult;

    /// Emit anything held back; called once, after the last posting
    fn flush(&mut self, next: &mut dyn FnMut(PostingRef<'j>) -> HandlerResult) -> HandlerResult {
        let _ = next;
        Ok(())
    }

    /// Get a description of this stage
    fn description(&self) -> String;
}

/// The terminal consumer of a chain
pub trait PostSink<'j> {
    /// Accept one posting
    fn receive(&mut self, post: PostingRef<'j>) -> HandlerResult;

    /// No more postings will arrive
    fn finalize(&mut self) -> HandlerResult {
        Ok(())
    }
}

/// Stages plus the sink they feed
pub struct PostChain<'j, S> {
    stages: Vec<Box<dyn PostHandler<'j> + 'j>>,
    sink: S,
    finalized: bool,
}

impl<'j, S: PostSink<'j>> PostChain<'j, S> {
    /// A chain that hands every posting straight to `sink`
    pub fn new(sink: S) -> Self {
        Self { stages: Vec::new(), sink, finalized: false }
    }

    /// Append a stage in front of the sink
    pub fn push_stage(&mut self, stage: Box<dyn PostHandler<'j> + 'j>) {
        self.stages.push(stage);
    }

    /// Builder-style [`push_stage`](Self::push_stage)
    pub fn with_stage(mut self, stage: Box<dyn PostHandler<'j> + 'j>) -> Self {
        self.push_stage(stage);
        self
    }

    /// Number of stages before the sink
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Descriptions of the stages, first to last
    pub fn descriptions(&self) -> Vec<String> {
        self.stages.iter().map(|stage| stage.description()).collect()
    }

    /// The sink at the end of the chain
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Take the sink, dropping the stages
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Whether the chain has been finalized
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

fn pass_down<'j, S: PostSink<'j>>(
    stages: &mut [Box<dyn PostHandler<'j> + 'j>],
    sink: &mut S,
    post: PostingRef<'j>,
) -> HandlerResult {
    match stages.split_first_mut() {
        None => sink.receive(post),
        Some((stage, rest)) => stage.handle(post, &mut |post| pass_down(rest, sink, post)),
    }
}

impl<'j, S: PostSink<'j>> PostSink<'j> for PostChain<'j, S> {
    fn receive(&mut self, post: PostingRef<'j>) -> HandlerResult {
        pass_down(&mut self.stages, &mut self.sink, post)
    }

    /// Flushes every stage in order, then the sink; later calls do nothing
    fn finalize(&mut self) -> HandlerResult {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        for index in 0..self.stages.len() {
            let (head, rest) = self.stages.split_at_mut(index + 1);
            let sink = &mut self.sink;
            head[index].flush(&mut |post| pass_down(rest, sink, post))?;
        }
        self.sink.finalize()
    }
}

impl<S: fmt::Debug> fmt::Debug for PostChain<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostChain")
            .field("stages", &self.stages)
            .field("sink", &self.sink)
            .field("finalized", &self.finalized)
            .finish()
    }
}

/// Feed every posting to `sink` in order, then finalize it
pub fn pass_down_posts<'j, S, I>(sink: &mut S, posts: I) -> HandlerResult
where
    S: PostSink<'j> + ?Sized,
    I: IntoIterator<Item = PostingRef<'j>>,
{
    let mut count = 0usize;
    for post in posts {
        sink.receive(post)?;
        count += 1;
    }
    debug!("passed {} posting(s) down the chain", count);
    sink.finalize()
}

/// Sink that keeps every posting it receives, in arrival order
#[derive(Debug, Default, Clone)]
pub struct CollectPosts<'j> {
    posts: Vec<PostingRef<'j>>,
}

impl<'j> CollectPosts<'j> {
    /// An empty collector
    pub fn new() -> Self {
        Self { posts: Vec::new() }
    }

    /// Number of postings collected
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Posting at `index`
    pub fn get(&self, index: usize) -> Option<PostingRef<'j>> {
        self.posts.get(index).copied()
    }

    /// Collected postings in arrival order
    pub fn iter(&self) -> impl Iterator<Item = PostingRef<'j>> + '_ {
        self.posts.iter().copied()
    }

    /// Collected postings as a slice
    pub fn posts(&self) -> &[PostingRef<'j>] {
        &self.posts
    }
}

impl<'j> PostSink<'j> for CollectPosts<'j> {
    fn receive(&mut self, post: PostingRef<'j>) -> HandlerResult {
        self.posts.push(post);
        Ok(())
    }
}

/// Stage forwarding only the postings a [`FilterChain`] accepts
#[derive(Debug)]
pub struct FilterPosts<'j> {
    journal: &'j Journal,
    filters: FilterChain,
}

impl<'j> FilterPosts<'j> {
    /// Filter postings of `journal` through `filters`
    pub fn new(journal: &'j Journal, filters: FilterChain) -> Self {
        Self { journal, filters }
    }
}

impl<'j> PostHandler<'j> for FilterPosts<'j> {
    fn handle(
        &mut self,
        post: PostingRef<'j>,
        next: &mut dyn FnMut(PostingRef<'j>) -> HandlerResult,
    ) -> HandlerResult {
        if self.filters.matches(self.journal, post) {
            next(post)
        } else {
            Ok(())
        }
    }

    fn description(&self) -> String {
        format!("filter [{}]", self.filters.descriptions().join(", "))
    }
}

/// Stage keeping the postings of the first `head` and last `tail` transactions
///
/// Postings are held until flush, since the number of transactions is only
/// known once the last posting has arrived.
#[derive(Debug, Default)]
pub struct TruncateXacts<'j> {
    head: Option<usize>,
    tail: Option<usize>,
    buffer: Vec<PostingRef<'j>>,
}

impl<'j> TruncateXacts<'j> {
    /// Keep the first `head` and the last `tail` transactions
    pub fn new(head: Option<usize>, tail: Option<usize>) -> Self {
        Self { head, tail, buffer: Vec::new() }
    }
}

impl<'j> PostHandler<'j> for TruncateXacts<'j> {
    fn handle(
        &mut self,
        post: PostingRef<'j>,
        _next: &mut dyn FnMut(PostingRef<'j>) -> HandlerResult,
    ) -> HandlerResult {
        self.buffer.push(post);
        Ok(())
    }

    fn flush(&mut self, next: &mut dyn FnMut(PostingRef<'j>) -> HandlerResult) -> HandlerResult {
        let buffer = std::mem::take(&mut self.buffer);

        // transaction ordinal of every buffered posting
        let mut ordinals = Vec::with_capacity(buffer.len());
        let mut ordinal = 0usize;
        for (index, post) in buffer.iter().enumerate() {
            if index > 0 && !std::ptr::eq(buffer[index - 1].xact, post.xact) {
                ordinal += 1;
            }
            ordinals.push(ordinal);
        }
        let total = if buffer.is_empty() { 0 } else { ordinal + 1 };

        for (post, ordinal) in buffer.into_iter().zip(ordinals) {
            let in_head = self.head.map(|head| ordinal < head).unwrap_or(false);
            let in_tail = self.tail.map(|tail| total - ordinal <= tail).unwrap_or(false);
            if in_head || in_tail {
                next(post)?;
            }
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("truncate head={:?} tail={:?}", self.head, self.tail)
    }
}
