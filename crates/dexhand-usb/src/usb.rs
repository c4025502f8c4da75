//! USB bulk 传输实现（rusb）
//!
//! 设备端固定一对 bulk 端点（OUT 0x01 / IN 0x81，接口 1）。
//! 发送经由后台 TX 线程串行写出，接收由 RX 线程循环读取并触发回调。

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, error, info, warn};

use crate::pool::BufferPool;
use crate::{
    MAX_TRANSFER_LENGTH, RECEIVE_BUFFER_COUNT, ReceiveCallback, TRANSMIT_BUFFER_COUNT,
    TransmitBuffer, Transport, TransportError,
};

const TARGET_INTERFACE: u8 = 0x01;
const OUT_ENDPOINT: u8 = 0x01;
const IN_ENDPOINT: u8 = 0x81;

/// RX/TX 轮询超时。超时属于正常情况，仅用于检查退出标志。
const IO_POLL_TIMEOUT: Duration = Duration::from_millis(100);

type TxItem = (Box<[u8; MAX_TRANSFER_LENGTH]>, usize);

/// 灵巧手 USB 传输
pub struct UsbTransport {
    shared: Arc<Shared>,
    tx_sender: Option<Sender<TxItem>>,
    tx_thread: Option<JoinHandle<()>>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    subscribed: AtomicBool,
}

struct Shared {
    handle: DeviceHandle<Context>,
    pool: Arc<BufferPool>,
    running: AtomicBool,
}

impl UsbTransport {
    /// 扫描并独占目标设备，启动 TX 线程
    ///
    /// # 参数
    /// - `usb_vid`: 厂商 ID
    /// - `usb_pid`: 可选产品 ID 过滤
    /// - `serial_number`: 可选序列号过滤（大小写敏感）
    ///
    /// 匹配到 0 个或多个设备都视为失败，并打印诊断清单帮助定位。
    pub fn open(
        usb_vid: u16,
        usb_pid: Option<u16>,
        serial_number: Option<&str>,
    ) -> Result<Self, TransportError> {
        let context = Context::new()?;
        let handle = select_device(&context, usb_vid, usb_pid, serial_number)?;

        // Linux 下内核驱动可能已绑定该接口，claim 前先解绑
        #[cfg(target_os = "linux")]
        match handle.kernel_driver_active(TARGET_INTERFACE) {
            Ok(true) => handle.detach_kernel_driver(TARGET_INTERFACE)?,
            Ok(false) => {},
            Err(rusb::Error::NotSupported) => {},
            Err(e) => return Err(e.into()),
        }

        handle.claim_interface(TARGET_INTERFACE)?;

        let shared = Arc::new(Shared {
            handle,
            pool: BufferPool::new(TRANSMIT_BUFFER_COUNT),
            running: AtomicBool::new(true),
        });

        let (tx_sender, tx_receiver) = crossbeam_channel::unbounded::<TxItem>();
        let tx_thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("dexhand-usb-tx".into())
                .spawn(move || tx_loop(shared, tx_receiver))
                .expect("failed to spawn USB TX thread")
        };

        info!("USB transport ready: vid=0x{usb_vid:04X}, interface={TARGET_INTERFACE}");

        Ok(Self {
            shared,
            tx_sender: Some(tx_sender),
            tx_thread: Some(tx_thread),
            rx_thread: Mutex::new(None),
            subscribed: AtomicBool::new(false),
        })
    }
}

impl Transport for UsbTransport {
    fn request_transmit_buffer(&self) -> Option<TransmitBuffer> {
        self.shared.pool.pop()
    }

    fn transmit(&self, buffer: TransmitBuffer, size: usize) -> Result<(), TransportError> {
        if size > MAX_TRANSFER_LENGTH {
            return Err(TransportError::TransmitTooLong {
                size,
                max: MAX_TRANSFER_LENGTH,
            });
        }

        let sender = self.tx_sender.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send((buffer.into_block(), size))
            .map_err(|_| TransportError::Closed)
    }

    fn receive(&self, callback: ReceiveCallback) -> Result<(), TransportError> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadySubscribed);
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("dexhand-usb-rx".into())
            .spawn(move || rx_loop(shared, callback))
            .expect("failed to spawn USB RX thread");

        *self.rx_thread.lock().unwrap() = Some(handle);
        Ok(())
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        // 关闭缓冲池（push 锁门控），之后的归还一律丢弃
        self.shared.pool.close();
        self.shared.running.store(false, Ordering::Release);

        // 断开发送通道，TX 线程在排空后退出
        drop(self.tx_sender.take());
        if let Some(handle) = self.tx_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.rx_thread.lock().unwrap().take() {
            let _ = handle.join();
        }

        let _ = self.shared.handle.release_interface(TARGET_INTERFACE);
        #[cfg(target_os = "linux")]
        let _ = self.shared.handle.attach_kernel_driver(TARGET_INTERFACE);
    }
}

/// TX 线程主循环：串行写出队列中的帧，完成后归还缓冲
fn tx_loop(shared: Arc<Shared>, queue: Receiver<TxItem>) {
    while let Ok((block, size)) = queue.recv() {
        match shared.handle.write_bulk(OUT_ENDPOINT, &block[..size], IO_POLL_TIMEOUT) {
            Ok(written) => {
                if written != size {
                    warn!("Short bulk write: {written} of {size} bytes");
                }
            },
            Err(rusb::Error::Timeout) => {
                warn!("Bulk write timed out, frame dropped ({size} bytes)");
            },
            Err(rusb::Error::NoDevice) => {
                error!("Bulk write failed: Device disconnected. Terminating...");
                std::process::exit(1);
            },
            Err(e) => {
                error!("Bulk write failed: {e}. Terminating...");
                std::process::exit(1);
            },
        }
        shared.pool.push(block);
    }
    debug!("USB TX thread: queue disconnected, exiting");
}

/// RX 线程主循环：循环提交 IN 传输，完成即回调
///
/// 不可恢复的读取失败（设备断开等）直接终止进程：
/// 断线恢复不在传输层职责内。
fn rx_loop(shared: Arc<Shared>, mut callback: ReceiveCallback) {
    let mut buffers = vec![[0u8; MAX_TRANSFER_LENGTH]; RECEIVE_BUFFER_COUNT];
    let mut next = 0usize;

    loop {
        // Acquire: 观察到 false 时，关停线程的清理写入已对本线程可见
        if !shared.running.load(Ordering::Acquire) {
            debug!("USB RX thread: running flag cleared, exiting");
            break;
        }

        let buffer = &mut buffers[next];
        next = (next + 1) % RECEIVE_BUFFER_COUNT;

        match shared.handle.read_bulk(IN_ENDPOINT, buffer, IO_POLL_TIMEOUT) {
            Ok(received) => {
                if received > 0 {
                    callback(&buffer[..received]);
                }
            },
            Err(rusb::Error::Timeout) => {},
            Err(rusb::Error::NoDevice) => {
                error!("Failed to re-submit receive transfer: Device disconnected. Terminating...");
                std::process::exit(1);
            },
            Err(e) => {
                error!("Failed to re-submit receive transfer: {e}. Terminating...");
                std::process::exit(1);
            },
        }
    }
}

/// 按 VID / PID / 序列号选择唯一设备
fn select_device(
    context: &Context,
    vendor_id: u16,
    product_id: Option<u16>,
    serial_number: Option<&str>,
) -> Result<DeviceHandle<Context>, TransportError> {
    let mut matched = Vec::new();
    let mut candidates = Vec::new();

    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("A device descriptor failed to get: {e}");
                continue;
            },
        };

        if descriptor.vendor_id() != vendor_id {
            continue;
        }
        // 设备必须带序列号描述符，否则无法可靠区分
        let Some(serial_index) = descriptor.serial_number_string_index() else {
            continue;
        };
        if serial_index == 0 {
            continue;
        }

        let handle = match device.open() {
            Ok(handle) => handle,
            Err(e) => {
                debug!(
                    "Skipping device {:04x}:{:04x}: open failed ({e})",
                    descriptor.vendor_id(),
                    descriptor.product_id()
                );
                continue;
            },
        };

        let serial = match handle.read_string_descriptor_ascii(serial_index) {
            Ok(serial) => serial,
            Err(e) => {
                debug!("Skipping device: serial descriptor unreadable ({e})");
                continue;
            },
        };

        let pid_ok = product_id.is_none_or(|pid| descriptor.product_id() == pid);
        let serial_ok = serial_number.is_none_or(|want| serial == want);

        candidates.push((descriptor.product_id(), serial.clone(), pid_ok && serial_ok));
        if pid_ok && serial_ok {
            matched.push(handle);
        }
    }

    if matched.len() == 1 {
        return Ok(matched.into_iter().next().unwrap());
    }

    // 匹配数不为 1：打印候选清单后报错
    let mut diagnostic = format!(
        "{} found with vendor id 0x{vendor_id:04x}",
        if matched.is_empty() {
            "No device".to_string()
        } else {
            format!("{} devices", matched.len())
        }
    );
    if let Some(pid) = product_id {
        diagnostic += &format!(", product id 0x{pid:04x}");
    }
    if let Some(serial) = serial_number {
        diagnostic += &format!(", serial number ({serial})");
    }
    error!("{diagnostic}");

    for (i, (pid, serial, hit)) in candidates.iter().enumerate() {
        error!(
            "Device {} ({vendor_id:04x}:{pid:04x}): Serial Number = {serial}{}",
            i + 1,
            if *hit { " <-- Matched" } else { "" }
        );
    }
    if matched.len() > 1 && serial_number.is_none() {
        error!("To ensure correct device selection, please specify the Serial Number");
    } else if matched.is_empty() && !candidates.is_empty() {
        error!("Consider relaxing some filters");
    }

    Err(TransportError::DeviceSelection(diagnostic))
}
