/// Step for every transition of (previous AB, current AB). Invalid double transitions count as 0.
const TRANSITIONS: [i8; 16] = [0, 1, -1, 0, -1, 0, 0, 1, 1, 0, 0, -1, 0, -1, 1, 0];

/// Decoder for a two channel incremental encoder, fed from pin change interrupts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadratureDecoder {
    state: u8,
}

impl QuadratureDecoder {
    pub const fn new() -> Self {
        Self { state: 0 }
    }

    /// Feed the current level of both channels and return the step since the last call.
    pub fn update(&mut self, a: bool, b: bool) -> i8 {
        let current = (u8::from(a) << 1) | u8::from(b);
        self.state = ((self.state << 2) | current) & 0x0F;
        TRANSITIONS[usize::from(self.state)]
    }
}

/// Absolute position accumulated from a [`QuadratureDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadratureCounter {
    decoder: QuadratureDecoder,
    position: i32,
}

impl QuadratureCounter {
    pub const fn new() -> Self {
        Self {
            decoder: QuadratureDecoder::new(),
            position: 0,
        }
    }

    pub fn update(&mut self, a: bool, b: bool) {
        let step = self.decoder.update(a, b);
        self.position = self.position.wrapping_add(i32::from(step));
    }

    pub const fn position(&self) -> i32 {
        self.position
    }

    pub fn clear(&mut self) {
        self.position = 0;
    }
}
