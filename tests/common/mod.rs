#![allow(dead_code)]

use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use quish_guard::{Trace, TraceMethod, Transport, TransportError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone)]
enum Route {
    /// Every URL after the requested one; the last entry is final
    Hops(Vec<String>),
    Fail(TransportError),
}

/// Transport answering from a script and logging every call with its
/// timeout. Unscripted URLs fail to connect. It ignores `max_redirects` on
/// purpose so the resolver's own cap is what gets exercised.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<(TraceMethod, String), Route>,
    calls: AtomicUsize,
    timeouts: Mutex<Vec<(TraceMethod, Duration)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both GET and HEAD of `url` follow `hops`
    pub fn redirects(self, url: &str, hops: &[&str]) -> Self {
        self.route(TraceMethod::Get, url, hops)
            .route(TraceMethod::Head, url, hops)
    }

    pub fn route(mut self, method: TraceMethod, url: &str, hops: &[&str]) -> Self {
        self.routes.insert(
            (method, url.to_string()),
            Route::Hops(hops.iter().map(|h| h.to_string()).collect()),
        );
        self
    }

    pub fn failing(mut self, method: TraceMethod, url: &str, error: TransportError) -> Self {
        self.routes.insert((method, url.to_string()), Route::Fail(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Method and timeout of every call, in order
    pub fn timeouts(&self) -> Vec<(TraceMethod, Duration)> {
        self.timeouts.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn trace(
        &self,
        method: TraceMethod,
        url: &str,
        timeout: Duration,
        _max_redirects: usize,
    ) -> Result<Trace, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().unwrap().push((method, timeout));
        match self.routes.get(&(method, url.to_string())) {
            Some(Route::Hops(hops)) => {
                let mut history = vec![url.to_string()];
                history.extend(hops.iter().cloned());
                let final_url = history.pop().unwrap_or_default();
                Ok(Trace { history, final_url })
            }
            Some(Route::Fail(error)) => Err(error.clone()),
            None => Err(TransportError::Connect(format!("no route to {url}"))),
        }
    }
}

/// Scratch directory holding test images
pub struct ImageDir {
    tmp: TempDir,
}

impl ImageDir {
    pub fn new() -> Self {
        Self {
            tmp: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    /// PNG of a QR code for `data`, 8 px per module with a 4 module quiet zone
    pub fn qr_png(&self, name: &str, data: &str) -> PathBuf {
        let path = self.path(name);
        render_qr(data, 8).save(&path).expect("write qr png");
        path
    }

    pub fn blank_png(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        GrayImage::from_pixel(240, 240, Luma([255]))
            .save(&path)
            .expect("write blank png");
        path
    }

    pub fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write file");
        path
    }
}

pub fn render_qr(data: &str, module_px: u32) -> GrayImage {
    let code = QrCode::new(data.as_bytes()).expect("encode qr");
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4;
    let side = (modules + 2 * quiet) * module_px;
    GrayImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / module_px, y / module_px);
        let inside = mx >= quiet && my >= quiet && mx < modules + quiet && my < modules + quiet;
        if inside && colors[((my - quiet) * modules + (mx - quiet)) as usize] == Color::Dark {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}
