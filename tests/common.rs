use std::sync::Once;

use flexi_logger::Logger;

static INIT: Once = Once::new();

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("judgebox=info")
      .unwrap()
      .start()
      .unwrap();
  });
}
