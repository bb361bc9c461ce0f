// 该文件是 Anjian （安检） 项目的一部分。
// src/task.rs - 推理任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::Duration;
use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧重复推理，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }
}

/// 去掉预热轮次后的平均耗时；轮次不足时使用全部样本
pub fn average_after_warmup(times: &[Duration], warmup: usize) -> Option<Duration> {
  let samples = if times.len() > warmup {
    &times[warmup..]
  } else {
    times
  };
  if samples.is_empty() {
    return None;
  }
  Some(samples.iter().sum::<Duration>() / samples.len() as u32)
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = std::time::Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }

    if let Some(average) = average_after_warmup(&times, self.warmup) {
      warn!("平均推理时间: {:.2?}", average);
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::{Cell, RefCell};
  use thiserror::Error;

  #[derive(Debug, Error)]
  #[error("never")]
  struct Never;

  struct Doubler {
    calls: Cell<usize>,
  }

  impl Model for &Doubler {
    type Input = u32;
    type Output = u32;
    type Error = Never;

    fn infer(&self, input: &u32) -> Result<u32, Never> {
      self.calls.set(self.calls.get() + 1);
      Ok(input * 2)
    }
  }

  #[derive(Default)]
  struct Collect(RefCell<Vec<u32>>);

  impl Render<u32, u32> for &Collect {
    type Error = Never;

    fn render_result(&self, _frame: &u32, result: &u32) -> Result<(), Never> {
      self.0.borrow_mut().push(*result);
      Ok(())
    }
  }

  #[test]
  fn one_shot_infers_first_frame_once() {
    let model = Doubler { calls: Cell::new(0) };
    let sink = Collect::default();
    OneShotTask
      .run_task(vec![21u32, 5].into_iter(), &model, &sink)
      .unwrap();
    assert_eq!(*sink.0.borrow(), vec![42]);
    assert_eq!(model.calls.get(), 1);
  }

  #[test]
  fn one_shot_without_input_fails() {
    let model = Doubler { calls: Cell::new(0) };
    let sink = Collect::default();
    let result = OneShotTask.run_task(std::iter::empty::<u32>(), &model, &sink);
    assert!(result.is_err());
  }

  #[test]
  fn repeat_shot_runs_requested_times_and_renders_once() {
    let model = Doubler { calls: Cell::new(0) };
    let sink = Collect::default();
    RepeatShotTask::default()
      .with_repeat(5)
      .run_task(std::iter::once(3u32), &model, &sink)
      .unwrap();
    assert_eq!(model.calls.get(), 5);
    assert_eq!(*sink.0.borrow(), vec![6]);
  }

  #[test]
  fn average_skips_warmup() {
    let times = [100, 100, 10, 20].map(Duration::from_millis);
    assert_eq!(average_after_warmup(&times, 2), Some(Duration::from_millis(15)));
    assert_eq!(average_after_warmup(&times[..1], 2), Some(Duration::from_millis(100)));
    assert_eq!(average_after_warmup(&[], 2), None);
  }
}
