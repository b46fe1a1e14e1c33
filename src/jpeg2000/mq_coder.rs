//! MQ Arithmetic Coder (ISO/IEC 15444-1 Annex C) and the raw bypass coder used by
//! selective arithmetic coding bypass.
//!
//! Context states are packed as `(state_index << 1) | mps`.

#[derive(Clone, Copy)]
struct MqContextState {
    qe: u32,
    nmps: u8,
    nlps: u8,
    switch: u8,
}

const fn st(qe: u32, nmps: u8, nlps: u8, switch: u8) -> MqContextState {
    MqContextState {
        qe,
        nmps,
        nlps,
        switch,
    }
}

// Standard Table C-2
const MQ_TABLE: [MqContextState; 47] = [
    st(0x5601, 1, 1, 1),
    st(0x3401, 2, 6, 0),
    st(0x1801, 3, 9, 0),
    st(0x0AC1, 4, 12, 0),
    st(0x0521, 5, 29, 0),
    st(0x0221, 38, 33, 0),
    st(0x5601, 7, 6, 1),
    st(0x5401, 8, 14, 0),
    st(0x4801, 9, 14, 0),
    st(0x3801, 10, 14, 0),
    st(0x3001, 11, 17, 0),
    st(0x2401, 12, 18, 0),
    st(0x1C01, 13, 20, 0),
    st(0x1601, 29, 21, 0),
    st(0x5601, 15, 14, 1),
    st(0x5401, 16, 14, 0),
    st(0x5101, 17, 15, 0),
    st(0x4801, 18, 16, 0),
    st(0x3801, 19, 17, 0),
    st(0x3401, 20, 18, 0),
    st(0x3001, 21, 19, 0),
    st(0x2801, 22, 19, 0),
    st(0x2401, 23, 20, 0),
    st(0x2201, 24, 21, 0),
    st(0x1C01, 25, 22, 0),
    st(0x1801, 26, 23, 0),
    st(0x1601, 27, 24, 0),
    st(0x1401, 28, 25, 0),
    st(0x1201, 29, 26, 0),
    st(0x1101, 30, 27, 0),
    st(0x0AC1, 31, 28, 0),
    st(0x09C1, 32, 29, 0),
    st(0x08A1, 33, 30, 0),
    st(0x0521, 34, 31, 0),
    st(0x0441, 35, 32, 0),
    st(0x02A1, 36, 33, 0),
    st(0x0221, 37, 34, 0),
    st(0x0141, 38, 35, 0),
    st(0x0111, 39, 36, 0),
    st(0x0085, 40, 37, 0),
    st(0x0049, 41, 38, 0),
    st(0x0025, 42, 39, 0),
    st(0x0015, 43, 40, 0),
    st(0x0009, 44, 41, 0),
    st(0x0005, 45, 42, 0),
    st(0x0001, 45, 43, 0),
    st(0x5601, 46, 46, 0),
];

// Marks a bypass coder that has not emitted a bit since its initialisation.
const BYPASS_CT_INIT: u32 = 0xDEAD_BEEF;

#[inline]
fn next_mps(packed: u8) -> u8 {
    let state = &MQ_TABLE[(packed >> 1) as usize];
    (state.nmps << 1) | (packed & 1)
}

#[inline]
fn next_lps(packed: u8) -> u8 {
    let state = &MQ_TABLE[(packed >> 1) as usize];
    (state.nlps << 1) | ((packed & 1) ^ state.switch)
}

#[inline]
fn qe(packed: u8) -> u32 {
    MQ_TABLE[(packed >> 1) as usize].qe
}

/// MQ encoder writing into an owned buffer. The buffer keeps one leading byte that
/// absorbs a carry out of the first output byte; coded data starts at index 1.
/// Also implements the raw bypass coder on the same buffer.
pub struct MqEncoder {
    a: u32,
    c: u32,
    ct: u32,
    bp: usize,
    buf: Vec<u8>,
    contexts: Vec<u8>,
}

impl MqEncoder {
    pub fn new(num_contexts: usize) -> Self {
        let mut encoder = Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            bp: 0,
            buf: Vec::new(),
            contexts: vec![0; num_contexts],
        };
        encoder.init_enc();
        encoder
    }

    /// Start a new code-block: empty output, registers at their initial values.
    /// Context states are left alone.
    pub fn init_enc(&mut self) {
        self.buf.clear();
        self.buf.push(0);
        self.bp = 0;
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
    }

    /// Set every context to state 0 with MPS 0.
    pub fn reset_states(&mut self) {
        self.contexts.fill(0);
    }

    pub fn set_state(&mut self, cx: usize, state_idx: u8, mps: u8) {
        self.contexts[cx] = (state_idx << 1) | (mps & 1);
    }

    #[inline]
    fn put(&mut self, idx: usize, byte: u8) {
        if idx >= self.buf.len() {
            self.buf.resize(idx + 1, 0);
        }
        self.buf[idx] = byte;
    }

    fn byte_out(&mut self) {
        if self.buf[self.bp] == 0xff {
            self.bp += 1;
            self.put(self.bp, (self.c >> 20) as u8);
            self.c &= 0xfffff;
            self.ct = 7;
        } else if self.c & 0x800_0000 == 0 {
            self.bp += 1;
            self.put(self.bp, (self.c >> 19) as u8);
            self.c &= 0x7ffff;
            self.ct = 8;
        } else {
            self.buf[self.bp] += 1;
            if self.buf[self.bp] == 0xff {
                self.c &= 0x7ff_ffff;
                self.bp += 1;
                self.put(self.bp, (self.c >> 20) as u8);
                self.c &= 0xfffff;
                self.ct = 7;
            } else {
                self.bp += 1;
                self.put(self.bp, (self.c >> 19) as u8);
                self.c &= 0x7ffff;
                self.ct = 8;
            }
        }
    }

    fn renorm(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// Code `bit` in context `cx`.
    pub fn encode(&mut self, cx: usize, bit: u32) {
        let packed = self.contexts[cx];
        let qe = qe(packed);
        self.a -= qe;
        if u32::from(packed & 1) == bit {
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    self.a = qe;
                } else {
                    self.c += qe;
                }
                self.contexts[cx] = next_mps(packed);
                self.renorm();
            } else {
                self.c += qe;
            }
        } else {
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            self.contexts[cx] = next_lps(packed);
            self.renorm();
        }
    }

    fn set_bits(&mut self) {
        let temp = self.c + self.a;
        self.c |= 0xffff;
        if self.c >= temp {
            self.c -= 0x8000;
        }
    }

    /// Terminate the arithmetic codeword (Annex C.2.9).
    pub fn flush(&mut self) {
        self.set_bits();
        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();
        if self.buf[self.bp] != 0xff {
            self.bp += 1;
        }
    }

    /// Re-initialise the registers after a terminated segment, continuing the same buffer.
    pub fn restart_init(&mut self) {
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
        self.bp -= 1;
        if self.buf[self.bp] == 0xff {
            self.ct = 13;
        }
    }

    /// Four symbols 1010 in context `cx`.
    pub fn segmark(&mut self, cx: usize) {
        for i in 1..5u32 {
            self.encode(cx, i % 2);
        }
    }

    /// Switch to raw coding after a terminated segment.
    pub fn bypass_init(&mut self) {
        self.c = 0;
        self.ct = BYPASS_CT_INIT;
    }

    pub fn bypass_encode(&mut self, bit: u32) {
        if self.ct == BYPASS_CT_INIT {
            self.ct = 8;
        }
        self.ct -= 1;
        self.c += bit << self.ct;
        if self.ct == 0 {
            let byte = self.c as u8;
            self.put(self.bp, byte);
            self.ct = if byte == 0xff { 7 } else { 8 };
            self.bp += 1;
            self.c = 0;
        }
    }

    /// Bytes a raw segment would still need if it were terminated now.
    pub fn bypass_extra_bytes(&self) -> usize {
        if self.ct < 7 || (self.ct == 7 && self.buf[self.bp - 1] != 0xff) {
            1
        } else {
            0
        }
    }

    /// Terminate a raw segment, padding the last byte with alternating bits.
    pub fn bypass_flush(&mut self) {
        if self.ct < 7 || (self.ct == 7 && self.buf[self.bp - 1] != 0xff) {
            let mut bit = 0u32;
            while self.ct > 0 {
                self.ct -= 1;
                self.c += bit << self.ct;
                bit ^= 1;
            }
            self.put(self.bp, self.c as u8);
            self.bp += 1;
        } else if self.ct == 7 && self.buf[self.bp - 1] == 0xff {
            self.bp -= 1;
        } else if self.ct == 8
            && self.bp >= 3
            && self.buf[self.bp - 1] == 0x7f
            && self.buf[self.bp - 2] == 0xff
        {
            self.bp -= 2;
        }
    }

    /// Bytes emitted so far, excluding the byte still open for a carry.
    pub fn num_bytes(&self) -> usize {
        self.bp.saturating_sub(1)
    }

    /// Upper bound on the codeword length if the MQ coder were terminated now.
    pub fn rate_estimate(&self) -> usize {
        self.bp + 2
    }

    /// The coded bytes counted by `num_bytes`.
    pub fn data(&self) -> &[u8] {
        &self.buf[1..self.bp.max(1)]
    }
}

/// MQ decoder over one terminated segment. Context states survive `init_dec`, so one
/// decoder serves all segments of a code-block.
pub struct MqDecoder<'a> {
    data: &'a [u8],
    bp: usize,
    a: u32,
    c: u32,
    ct: u32,
    contexts: Vec<u8>,
}

impl<'a> MqDecoder<'a> {
    pub fn new(num_contexts: usize) -> Self {
        Self {
            data: &[],
            bp: 0,
            a: 0x8000,
            c: 0,
            ct: 0,
            contexts: vec![0; num_contexts],
        }
    }

    pub fn reset_states(&mut self) {
        self.contexts.fill(0);
    }

    pub fn set_state(&mut self, cx: usize, state_idx: u8, mps: u8) {
        self.contexts[cx] = (state_idx << 1) | (mps & 1);
    }

    /// Start decoding `data`. Bytes past its end read as 0xFF.
    pub fn init_dec(&mut self, data: &'a [u8]) {
        self.data = data;
        self.bp = 0;
        self.c = u32::from(data.first().copied().unwrap_or(0xff)) << 16;
        self.byte_in();
        self.c <<= 7;
        self.ct -= 7;
        self.a = 0x8000;
    }

    fn byte_in(&mut self) {
        let end = self.data.len();
        if self.bp < end {
            let next = if self.bp + 1 < end {
                u32::from(self.data[self.bp + 1])
            } else {
                0xff
            };
            if self.data[self.bp] == 0xff {
                if next > 0x8f {
                    self.c = self.c.wrapping_add(0xff00);
                    self.ct = 8;
                } else {
                    self.bp += 1;
                    self.c = self.c.wrapping_add(next << 9);
                    self.ct = 7;
                }
            } else {
                self.bp += 1;
                self.c = self.c.wrapping_add(next << 8);
                self.ct = 8;
            }
        } else {
            self.c = self.c.wrapping_add(0xff00);
            self.ct = 8;
        }
    }

    fn renorm(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a >= 0x8000 {
                break;
            }
        }
    }

    pub fn decode(&mut self, cx: usize) -> u32 {
        let packed = self.contexts[cx];
        let mps = u32::from(packed & 1);
        let qe = qe(packed);
        self.a = self.a.wrapping_sub(qe);
        if (self.c >> 16) < qe {
            let bit = if self.a < qe {
                self.contexts[cx] = next_mps(packed);
                mps
            } else {
                self.contexts[cx] = next_lps(packed);
                1 - mps
            };
            self.a = qe;
            self.renorm();
            bit
        } else {
            self.c -= qe << 16;
            if self.a & 0x8000 == 0 {
                let bit = if self.a < qe {
                    self.contexts[cx] = next_lps(packed);
                    1 - mps
                } else {
                    self.contexts[cx] = next_mps(packed);
                    mps
                };
                self.renorm();
                bit
            } else {
                mps
            }
        }
    }
}

/// Raw (bypass) decoder. Reads past the end yield 0xFF bytes.
pub struct RawDecoder<'a> {
    data: &'a [u8],
    len: usize,
    c: u32,
    ct: u32,
}

impl<'a> RawDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            len: 0,
            c: 0,
            ct: 0,
        }
    }

    pub fn decode(&mut self) -> u32 {
        if self.ct == 0 {
            self.ct = 8;
            if self.len == self.data.len() {
                self.c = 0xff;
            } else {
                if self.c == 0xff {
                    self.ct = 7;
                }
                self.c = u32::from(self.data[self.len]);
                self.len += 1;
            }
        }
        self.ct -= 1;
        (self.c >> self.ct) & 1
    }
}
