//! Wire-format frame builders for the bundled sensor models

const STX: u8 = 0x02;
const CR: u8 = b'\r';

/// One PCE-AQD 20 line with one decimal place
pub fn pce_line(kind: u8, unit: &[u8; 2], value: f64) -> Vec<u8> {
    let sign = if value < 0.0 { b'1' } else { b'0' };
    let magnitude = (value.abs() * 10.0).round() as u32;

    let mut line = Vec::with_capacity(16);
    line.extend_from_slice(&[STX, b'4', kind]);
    line.extend_from_slice(unit);
    line.extend_from_slice(&[sign, b'1']);
    line.extend_from_slice(format!("{:08}", magnitude).as_bytes());
    line.push(CR);
    line
}

/// Complete five-line PCE-AQD 20 dataset
pub fn pce_dataset(pm25: f64, humidity: f64, temperature: f64, co2: f64, pressure: f64) -> Vec<Vec<u8>> {
    vec![
        pce_line(b'1', b"H0", pm25),
        pce_line(b'2', b"04", humidity),
        pce_line(b'3', b"01", temperature),
        pce_line(b'4', b"G4", co2),
        pce_line(b'5', b"91", pressure),
    ]
}

/// Plantower measurement object with bare keys and the given readings
pub fn plantower_object(pm25: f64, temperature: f64, humidity: f64) -> Vec<u8> {
    format!(
        "{{cpm2.5:{pm25},cpm1.0:{pm25},cpm10:{pm25},apm2.5:{pm25},apm1.0:{pm25},apm10:{pm25},\
         t:{temperature},r:{humidity},aqi:10,f1:0,f2:0,f3:0,f4:0,f5:0,f6:0,f7:0}}"
    )
    .into_bytes()
}

/// Xiaomi Mi notification payload for a non-negative temperature
pub fn xiaomi_payload(temperature: f64, humidity: u8) -> Vec<u8> {
    let centi = (temperature * 100.0).round() as u16;
    let [low, high] = centi.to_le_bytes();
    vec![low, high, humidity]
}
