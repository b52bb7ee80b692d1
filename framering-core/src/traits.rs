use crate::frame::FrameView;

/// 帧接收端契约
///
/// 帧源 (相机回调、仿真器) 每捕获一帧就调用一次 `on_frame`；
/// 调用发生在帧源自己的调用上下文里，实现方必须立即返回，
/// 并且吞掉一切内部错误 —— 帧源宿主进程永远不能观察到异常逃逸。
pub trait FrameSink: Send {
    /// 投递一帧。没有返回值：丢帧、断连、熔断都在实现内部消化。
    fn on_frame(&mut self, frame: FrameView<'_>);
}

// 为 Box<T> 实现 FrameSink，这样 Box<dyn FrameSink> 也能被当做 FrameSink 使用
impl<S: FrameSink + ?Sized + Send> FrameSink for Box<S> {
    fn on_frame(&mut self, frame: FrameView<'_>) {
        (**self).on_frame(frame)
    }
}
